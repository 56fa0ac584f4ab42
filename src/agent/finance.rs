//! Finance department agent: invoices, payments, reconciliation.

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
You are the finance agent for a business operations platform. You review \
invoices and payment records, update their status fields, and prepare \
payment actions. You may only touch the records this task was opened for. \
Any payment you prepare is a draft that a human must approve; you never \
move money yourself.";

/// The finance agent's closed tool set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    StoreRead,
    StoreList,
    StoreWrite,
    SchedulePayment,
}

impl ToolKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "store_read" => Some(Self::StoreRead),
            "store_list" => Some(Self::StoreList),
            "store_write" => Some(Self::StoreWrite),
            "schedule_payment" => Some(Self::SchedulePayment),
            _ => None,
        }
    }

    fn is_sensitive(self) -> bool {
        matches!(self, Self::SchedulePayment)
    }
}

pub struct FinanceAgent {
    store: Arc<RecordStoreClient>,
}

impl FinanceAgent {
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DepartmentAgent for FinanceAgent {
    fn agent_type(&self) -> &str {
        "finance"
    }

    fn default_system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    fn build_task_prompt(&self, ctx: &TaskContext) -> String {
        format!(
            "A '{}' event arrived for record '{}' in the '{}' collection.\n\
             Payload:\n{}\n\n\
             Review the record, bring its financial fields up to date, and \
             prepare any payment action as a draft.",
            ctx.trigger_event,
            ctx.item_id,
            ctx.collection,
            serde_json::to_string_pretty(&ctx.payload).unwrap_or_else(|_| "{}".to_string()),
        )
    }

    fn tool_catalog(&self) -> Vec<ToolDefinition> {
        let mut tools = store_tool_definitions();
        tools.push(ToolDefinition::new(
            "schedule_payment",
            "Draft a payment for human approval. Never executes directly.",
            json!({
                "type": "object",
                "properties": {
                    "payee": {"type": "string"},
                    "amount": {"type": "number"},
                    "currency": {"type": "string"},
                    "reference": {"type": "string", "description": "invoice or record id"}
                },
                "required": ["payee", "amount", "reference"]
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
            ToolKind::SchedulePayment => {
                draft_action(&self.store, self.agent_type(), "schedule_payment", input.clone())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_is_closed() {
        assert!(ToolKind::from_name("schedule_payment").is_some());
        assert!(ToolKind::from_name("store_read").is_some());
        assert!(ToolKind::from_name("delete_everything").is_none());
    }

    #[test]
    fn test_only_payment_is_sensitive() {
        let agent = FinanceAgent::new(Arc::new(RecordStoreClient::test_client()));
        assert!(agent.is_sensitive("schedule_payment"));
        assert!(!agent.is_sensitive("store_write"));
        assert!(!agent.is_sensitive("no_such_tool"));
    }
}
