//! Email agent: triages incoming mail and drafts replies.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::agent::descriptor::{
    DepartmentAgent, TaskContext, draft_action, handle_store_tool, store_tool_definitions,
};
use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::store::RecordStoreClient;

const SYSTEM_PROMPT: &str = "\
You are the email agent for a business operations platform. You triage \
incoming email records: categorize them, update their status, and draft \
replies where one is needed. Every reply is a draft for human approval; \
you never send mail. Only the email record this task was opened for is in \
scope.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    StoreRead,
    StoreList,
    StoreWrite,
    DraftReply,
}

impl ToolKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "store_read" => Some(Self::StoreRead),
            "store_list" => Some(Self::StoreList),
            "store_write" => Some(Self::StoreWrite),
            "draft_reply" => Some(Self::DraftReply),
            _ => None,
        }
    }

    fn is_sensitive(self) -> bool {
        matches!(self, Self::DraftReply)
    }
}

pub struct EmailAgent {
    store: Arc<RecordStoreClient>,
}

impl EmailAgent {
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DepartmentAgent for EmailAgent {
    fn agent_type(&self) -> &str {
        "email"
    }

    fn default_system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_task_prompt(&self, ctx: &TaskContext) -> String {
        format!(
            "A '{}' event arrived for email record '{}' in the '{}' \
             collection.\nPayload:\n{}\n\n\
             Triage the email: set its category and status, and draft a \
             reply if the sender expects one.",
            ctx.trigger_event,
            ctx.item_id,
            ctx.collection,
            serde_json::to_string_pretty(&ctx.payload).unwrap_or_else(|_| "{}".to_string()),
        )
    }

    fn tool_catalog(&self) -> Vec<ToolDefinition> {
        let mut tools = store_tool_definitions();
        tools.push(ToolDefinition::new(
            "draft_reply",
            "Draft an email reply for human approval. Never sends.",
            json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "subject": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["to", "subject", "body"]
            }),
        ));
        tools
    }

    fn is_sensitive(&self, tool_name: &str) -> bool {
        ToolKind::from_name(tool_name).is_some_and(ToolKind::is_sensitive)
    }

    async fn handle_tool(
        &self,
        tool_name: &str,
        input: &Value,
        _ctx: &TaskContext,
    ) -> Result<Value, ToolError> {
        let kind = ToolKind::from_name(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        match kind {
            ToolKind::StoreRead | ToolKind::StoreList | ToolKind::StoreWrite => {
                match handle_store_tool(&self.store, tool_name, input).await {
                    Some(result) => result,
                    None => Err(ToolError::UnknownTool(tool_name.to_string())),
                }
            }
            ToolKind::DraftReply => {
                draft_action(&self.store, self.agent_type(), "draft_reply", input.clone()).await
            }
        }
    }
}
