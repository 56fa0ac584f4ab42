//! Multi-turn conversation driver for department agents.
//!
//! Runs one agent conversation as a small state machine: send the
//! transcript, execute any requested tools, feed the results back, repeat
//! until the model stops talking or the turn budget runs out. Access
//! validation happens here, between the model's request and the tool's
//! execution, so a denial reaches the model as an ordinary tool result.

use std::sync::Arc;

use serde_json::Value;

use crate::agent::descriptor::{DepartmentAgent, TaskContext, is_draft};
use crate::error::{DriverError, ToolError};
use crate::llm::{
    ChatMessage, FinishReason, LlmProvider, TokenUsage, ToolCall, ToolCompletionRequest,
};
use crate::session::{AccessDecision, AccessValidator};

/// What one completed drive produced.
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub text: String,
    pub usage: TokenUsage,
    pub turns: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveState {
    Sending,
    AwaitingToolResults,
    Complete,
}

/// Drives one agent conversation to completion.
pub struct ConversationDriver {
    llm: Arc<dyn LlmProvider>,
    validator: Arc<AccessValidator>,
    max_turns: u32,
    max_tokens: u32,
}

impl ConversationDriver {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        validator: Arc<AccessValidator>,
        max_turns: u32,
        max_tokens: u32,
    ) -> Self {
        Self {
            llm,
            validator,
            max_turns,
            max_tokens,
        }
    }

    /// Run the agent against its task until the model finishes.
    ///
    /// `system_prompt` is passed in rather than read off the descriptor so
    /// the caller can apply a store override.
    pub async fn drive(
        &self,
        agent: &dyn DepartmentAgent,
        system_prompt: &str,
        ctx: &TaskContext,
    ) -> Result<DriveOutcome, DriverError> {
        let tools = agent.tool_catalog();
        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(agent.build_task_prompt(ctx)),
        ];

        let mut usage = TokenUsage::default();
        let mut state = DriveState::Sending;
        let mut turns = 0u32;
        let mut final_text = String::new();
        let mut pending_calls: Vec<ToolCall> = Vec::new();

        loop {
            state = match state {
                DriveState::Sending => {
                    if turns >= self.max_turns {
                        tracing::warn!(
                            agent = agent.agent_type(),
                            session_id = %ctx.session_id,
                            max_turns = self.max_turns,
                            "Conversation exceeded its turn budget"
                        );
                        return Err(DriverError::TurnBudgetExceeded(self.max_turns));
                    }
                    turns += 1;

                    let request = ToolCompletionRequest::new(messages.clone(), tools.clone())
                        .with_max_tokens(self.max_tokens);
                    let response = self.llm.complete_with_tools(request).await?;
                    usage.add(response.usage);

                    match response.finish_reason {
                        FinishReason::ToolUse if !response.tool_calls.is_empty() => {
                            messages.push(ChatMessage::assistant_with_tool_calls(
                                response.content.unwrap_or_default(),
                                response.tool_calls.clone(),
                            ));
                            pending_calls = response.tool_calls;
                            DriveState::AwaitingToolResults
                        }
                        _ => {
                            final_text = response.content.unwrap_or_default();
                            DriveState::Complete
                        }
                    }
                }
                DriveState::AwaitingToolResults => {
                    for call in std::mem::take(&mut pending_calls) {
                        let result = self.execute_tool(agent, ctx, &call).await?;
                        messages.push(ChatMessage::tool_result(&call.id, &call.name, result));
                    }
                    DriveState::Sending
                }
                DriveState::Complete => break,
            };
        }

        tracing::debug!(
            agent = agent.agent_type(),
            session_id = %ctx.session_id,
            turns,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Conversation complete"
        );

        Ok(DriveOutcome {
            text: final_text,
            usage,
            turns,
        })
    }

    /// Validate and run one tool call, producing the result text the model
    /// will see. Handler failures are reported to the model rather than
    /// aborting the conversation; a missing draft marker on a sensitive
    /// tool aborts, since that is a bug in the agent, not in the model.
    async fn execute_tool(
        &self,
        agent: &dyn DepartmentAgent,
        ctx: &TaskContext,
        call: &ToolCall,
    ) -> Result<String, DriverError> {
        let decision = self
            .validator
            .validate(ctx.session_id, &call.name, &call.arguments)
            .await
            .map_err(|e| DriverError::Tool(ToolError::ExecutionFailed(e.to_string())))?;

        if let AccessDecision::Denied { reason } = decision {
            return Ok(reason);
        }

        match agent.handle_tool(&call.name, &call.arguments, ctx).await {
            Ok(result) => {
                if agent.is_sensitive(&call.name) && !is_draft(&result) {
                    return Err(ToolError::MissingDraftMarker(call.name.clone()).into());
                }
                Ok(render_result(&result))
            }
            Err(err @ ToolError::MissingDraftMarker(_)) => Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    agent = agent.agent_type(),
                    tool = %call.name,
                    "Tool failed: {err}"
                );
                Ok(format!("Tool error: {err}"))
            }
        }
    }
}

fn render_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_result_unwraps_strings() {
        assert_eq!(render_result(&json!("plain text")), "plain text");
        assert_eq!(render_result(&json!({"k": 1})), r#"{"k":1}"#);
    }
}
