//! LLM integration.
//!
//! The conversation driver and task classifier consume the [`LlmProvider`]
//! trait; [`AnthropicProvider`] is the production implementation over the
//! Messages API. Tests inject deterministic stubs behind the same trait.

mod anthropic;
mod provider;

pub use anthropic::AnthropicProvider;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    TokenUsage, ToolCall, ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

use std::sync::Arc;

use crate::config::LlmConfig;

/// Create the production LLM provider from configuration.
pub fn create_llm_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!(model = %config.model, "Using Anthropic Messages API");
    Arc::new(AnthropicProvider::new(config.clone()))
}
