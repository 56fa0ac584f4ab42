//! Marketing department agent: leads, campaigns, outreach.
//!
//! Also serves the `lead` agent type, since lead intake is marketing work.

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
You are the marketing agent for a business operations platform. You qualify \
incoming leads, keep their records current, and propose outreach. Outreach \
is always drafted for human approval; you never contact anyone directly. \
Stay within the records this task was opened for.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    StoreRead,
    StoreList,
    StoreWrite,
    DraftOutreach,
}

impl ToolKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "store_read" => Some(Self::StoreRead),
            "store_list" => Some(Self::StoreList),
            "store_write" => Some(Self::StoreWrite),
            "draft_outreach" => Some(Self::DraftOutreach),
            _ => None,
        }
    }

    fn is_sensitive(self) -> bool {
        matches!(self, Self::DraftOutreach)
    }
}

pub struct MarketingAgent {
    store: Arc<RecordStoreClient>,
}

impl MarketingAgent {
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DepartmentAgent for MarketingAgent {
    fn agent_type(&self) -> &str {
        "marketing"
    }

    fn default_system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_task_prompt(&self, ctx: &TaskContext) -> String {
        format!(
            "A '{}' event arrived for record '{}' in the '{}' collection.\n\
             Payload:\n{}\n\n\
             Qualify the lead or update the campaign record, then draft any \
             outreach you recommend.",
            ctx.trigger_event,
            ctx.item_id,
            ctx.collection,
            serde_json::to_string_pretty(&ctx.payload).unwrap_or_else(|_| "{}".to_string()),
        )
    }

    fn tool_catalog(&self) -> Vec<ToolDefinition> {
        let mut tools = store_tool_definitions();
        tools.push(ToolDefinition::new(
            "draft_outreach",
            "Draft an outreach message for human approval",
            json!({
                "type": "object",
                "properties": {
                    "recipient": {"type": "string"},
                    "channel": {"type": "string", "enum": ["email", "phone", "linkedin"]},
                    "message": {"type": "string"}
                },
                "required": ["recipient", "channel", "message"]
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
            ToolKind::DraftOutreach => {
                draft_action(&self.store, self.agent_type(), "draft_outreach", input.clone()).await
            }
        }
    }
}
