//! Client services agent: trackers, tasks, milestones, client follow-ups.
//!
//! Also serves the `tracker` agent type and is the landing spot for the
//! production and operations departments.

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
You are the client services agent for a business operations platform. You \
keep project trackers, tasks and milestones current and flag anything a \
client needs to hear about. Client communication is drafted for human \
approval, never sent by you. Only touch the records this task concerns.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    StoreRead,
    StoreList,
    StoreWrite,
    NotifyClient,
}

impl ToolKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "store_read" => Some(Self::StoreRead),
            "store_list" => Some(Self::StoreList),
            "store_write" => Some(Self::StoreWrite),
            "notify_client" => Some(Self::NotifyClient),
            _ => None,
        }
    }

    fn is_sensitive(self) -> bool {
        matches!(self, Self::NotifyClient)
    }
}

pub struct ClientServicesAgent {
    store: Arc<RecordStoreClient>,
}

impl ClientServicesAgent {
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DepartmentAgent for ClientServicesAgent {
    fn agent_type(&self) -> &str {
        "client_services"
    }

    fn default_system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_task_prompt(&self, ctx: &TaskContext) -> String {
        format!(
            "A '{}' event arrived for record '{}' in the '{}' collection.\n\
             Payload:\n{}\n\n\
             Bring the tracker up to date and draft a client notification if \
             the change warrants one.",
            ctx.trigger_event,
            ctx.item_id,
            ctx.collection,
            serde_json::to_string_pretty(&ctx.payload).unwrap_or_else(|_| "{}".to_string()),
        )
    }

    fn tool_catalog(&self) -> Vec<ToolDefinition> {
        let mut tools = store_tool_definitions();
        tools.push(ToolDefinition::new(
            "notify_client",
            "Draft a client notification for human approval",
            json!({
                "type": "object",
                "properties": {
                    "client": {"type": "string"},
                    "subject": {"type": "string"},
                    "message": {"type": "string"}
                },
                "required": ["client", "message"]
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
            ToolKind::NotifyClient => {
                draft_action(&self.store, self.agent_type(), "notify_client", input.clone()).await
            }
        }
    }
}
