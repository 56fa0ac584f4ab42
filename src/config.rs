//! Environment-driven configuration.
//!
//! All settings come from environment variables (loaded via dotenvy in
//! `main`), with sane defaults for everything that is not a credential.
//! Secrets are wrapped in `secrecy::SecretString` so they never end up in
//! debug output or logs.

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Error loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
}

/// Webhook ingress server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret required on webhook deliveries (if set).
    pub webhook_secret: Option<SecretString>,
}

/// LLM conversation service settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    /// Round-trip budget for one tool-use conversation.
    pub max_turns: u32,
    pub timeout: Duration,
}

/// Record store client settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub token: SecretString,
}

/// Session and access-control settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Once a session accumulates this many violations, all further
    /// data-store calls in it are denied. `None` means count-and-log only.
    pub violation_limit: Option<u32>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig {
                host: env_or("WARDEN_HOST", "0.0.0.0"),
                port: env_parse_or("WARDEN_PORT", 5002)?,
                webhook_secret: std::env::var("WARDEN_WEBHOOK_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(SecretString::from),
            },
            llm: LlmConfig {
                base_url: env_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
                api_key: require_env("ANTHROPIC_API_KEY")?,
                model: env_or("WARDEN_MODEL", "claude-sonnet-4-20250514"),
                max_tokens: env_parse_or("WARDEN_MAX_TOKENS", 4096)?,
                max_turns: env_parse_or("WARDEN_MAX_TURNS", 10)?,
                timeout: Duration::from_secs(env_parse_or("WARDEN_LLM_TIMEOUT_SECS", 120)?),
            },
            store: StoreConfig {
                base_url: env_or("RECORD_STORE_URL", "http://localhost:8055"),
                token: require_env("RECORD_STORE_TOKEN")?,
            },
            session: SessionConfig {
                violation_limit: match std::env::var("WARDEN_VIOLATION_LIMIT") {
                    Ok(raw) => Some(raw.parse().map_err(|e| ConfigError::InvalidVar {
                        name: "WARDEN_VIOLATION_LIMIT",
                        reason: format!("{e}"),
                    })?),
                    Err(_) => None,
                },
            },
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require_env(name: &'static str) -> Result<SecretString, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
        .ok_or(ConfigError::MissingVar(name))
}

fn env_parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidVar {
            name,
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}
