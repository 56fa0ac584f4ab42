//! Error types for every subsystem.
//!
//! Each subsystem carries its own `thiserror` enum so callers can make
//! informed decisions (retryable vs. not, parse vs. transport) instead of
//! matching on strings. `anyhow` is reserved for `main`.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::agent::Department;

/// Errors from the LLM conversation service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("LLM connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("LLM authentication failed")]
    AuthFailed,

    #[error("LLM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid LLM response: {reason}")]
    InvalidResponse { reason: String },
}

impl LlmError {
    /// Whether a caller could reasonably retry the request.
    ///
    /// Retry policy itself belongs to the caller; this core never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout(_) | LlmError::RateLimited { .. } | LlmError::ConnectionFailed { .. }
        )
    }
}

/// Errors from the record store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Record store API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid record store response: {reason}")]
    InvalidResponse { reason: String },
}

/// Errors from the session registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown session {0} - expired or never existed")]
    UnknownSession(Uuid),
}

/// Errors from department tool handlers.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Sensitive tool '{0}' returned a result without a draft marker")]
    MissingDraftMarker(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the task classifier.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Classification response did not contain a valid classification: {reason}")]
    Parse { reason: String, raw: String },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Errors from the conversation driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Exceeded maximum turns ({0})")]
    TurnBudgetExceeded(u32),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Errors from routing a task to a department agent.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Agent '{0}' is currently disabled")]
    AgentDisabled(String),

    #[error("No agent available for department '{0}'")]
    NoAgentForDepartment(Department),

    #[error("Webhook delivery carried no record key")]
    MissingRecordId,

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
