//! Anthropic Messages API provider implementation.
//!
//! Speaks the Messages API directly over reqwest: system prompt as a top
//! level field, tool results as user-role content blocks, and `stop_reason`
//! mapped onto [`FinishReason`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, TokenUsage,
    ToolCall, ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    config: LlmConfig,
}

impl AnthropicProvider {
    /// Create a new provider with API key auth.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    fn api_url(&self) -> String {
        format!(
            "{}/v1/messages",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn send_request(&self, body: &MessagesRequest) -> Result<MessagesResponse, LlmError> {
        let url = self.api_url();

        tracing::debug!(model = %body.model, "Sending request to Anthropic: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout)
                } else {
                    LlmError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let response_text = response.text().await.unwrap_or_default();

        tracing::debug!("Anthropic response status: {}", status);

        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LlmError::AuthFailed);
            }
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited { retry_after });
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: response_text,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
            reason: format!("JSON parse error: {}. Raw: {}", e, response_text),
        })
    }

    fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> MessagesRequest {
        let (system, wire_messages) = convert_messages(messages);

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .into_iter()
                    .map(|t| WireTool {
                        name: t.name,
                        description: t.description,
                        input_schema: t.parameters,
                    })
                    .collect(),
            )
        };

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: max_tokens.unwrap_or(self.config.max_tokens),
            system,
            messages: wire_messages,
            tools,
            temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let request = self.build_request(req.messages, Vec::new(), req.max_tokens, req.temperature);
        let response = self.send_request(&request).await?;

        let content = response
            .content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            finish_reason: map_stop_reason(response.stop_reason.as_deref()),
            usage: response.usage.into(),
        })
    }

    async fn complete_with_tools(
        &self,
        req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let request = self.build_request(req.messages, req.tools, req.max_tokens, req.temperature);
        let response = self.send_request(&request).await?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::ToolResult { .. } => {
                    return Err(LlmError::InvalidResponse {
                        reason: "tool_result block in assistant response".to_string(),
                    });
                }
            }
        }

        let content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join(""))
        };

        Ok(ToolCompletionResponse {
            content,
            tool_calls,
            finish_reason: map_stop_reason(response.stop_reason.as_deref()),
            usage: response.usage.into(),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn map_stop_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("tool_use") => FinishReason::ToolUse,
        Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::Unknown,
    }
}

/// Convert provider-neutral messages into the Messages API shape.
///
/// System messages are lifted into the top-level `system` field; tool
/// results become user-role `tool_result` blocks; assistant tool calls
/// become `tool_use` blocks.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts = Vec::new();
    let mut wire: Vec<WireMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content),
            Role::User => wire.push(WireMessage {
                role: "user".to_string(),
                content: vec![ContentBlock::Text { text: msg.content }],
            }),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(ContentBlock::Text { text: msg.content });
                }
                for call in msg.tool_calls.unwrap_or_default() {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id,
                        name: call.name,
                        input: call.arguments,
                    });
                }
                wire.push(WireMessage {
                    role: "assistant".to_string(),
                    content: blocks,
                });
            }
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.unwrap_or_default(),
                    content: msg.content,
                };
                // Consecutive tool results share one user message.
                match wire.last_mut() {
                    Some(last) if last.role == "user" && last.is_tool_results() => {
                        last.content.push(block);
                    }
                    _ => wire.push(WireMessage {
                        role: "user".to_string(),
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, wire)
}

// Messages API wire types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Vec<ContentBlock>,
}

impl WireMessage {
    fn is_tool_results(&self) -> bool {
        self.content
            .iter()
            .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_lifted() {
        let (system, wire) = convert_messages(vec![
            ChatMessage::system("You are an agent."),
            ChatMessage::user("Hello"),
        ]);
        assert_eq!(system.as_deref(), Some("You are an agent."));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_tool_results_share_one_user_message() {
        let calls = vec![
            ToolCall {
                id: "c1".into(),
                name: "store_read".into(),
                arguments: serde_json::json!({}),
            },
            ToolCall {
                id: "c2".into(),
                name: "store_read".into(),
                arguments: serde_json::json!({}),
            },
        ];
        let (_, wire) = convert_messages(vec![
            ChatMessage::user("go"),
            ChatMessage::assistant_with_tool_calls("", calls),
            ChatMessage::tool_result("c1", "store_read", "one"),
            ChatMessage::tool_result("c2", "store_read", "two"),
        ]);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[2].role, "user");
        assert_eq!(wire[2].content.len(), 2);
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(map_stop_reason(Some("end_turn")), FinishReason::Stop);
        assert_eq!(map_stop_reason(Some("tool_use")), FinishReason::ToolUse);
        assert_eq!(map_stop_reason(Some("max_tokens")), FinishReason::Length);
        assert_eq!(map_stop_reason(None), FinishReason::Unknown);
    }
}
