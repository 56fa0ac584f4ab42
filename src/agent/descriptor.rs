//! Department agent descriptors: the static shape of each agent.
//!
//! A descriptor carries no per-task state. Everything task-specific flows
//! through `TaskContext`; everything store-related goes through the shared
//! store tools so the conversation driver can validate the calls.

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::store::{RecordStoreClient, WORKFLOWS_COLLECTION};

/// Everything an agent knows about the task it was dispatched for.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub session_id: Uuid,
    pub trigger_event: String,
    pub collection: String,
    pub item_id: String,
    pub payload: Value,
}

/// One department's static descriptor.
///
/// Tool names are parsed into each agent's closed tool-kind enum before any
/// handler runs; a name outside the enum is `ToolError::UnknownTool`, never
/// a dynamic lookup.
#[async_trait]
pub trait DepartmentAgent: Send + Sync {
    fn agent_type(&self) -> &str;

    /// Prompt used when no store override exists for this agent.
    fn default_system_prompt(&self) -> &str;

    fn build_task_prompt(&self, ctx: &TaskContext) -> String;

    fn tool_catalog(&self) -> Vec<ToolDefinition>;

    /// Sensitive tools must return a draft; the driver enforces the marker.
    fn is_sensitive(&self, tool_name: &str) -> bool;

    async fn handle_tool(
        &self,
        tool_name: &str,
        input: &Value,
        ctx: &TaskContext,
    ) -> Result<Value, ToolError>;
}

/// Store tools shared by every agent. Their `store_` prefix is what routes
/// them through access validation.
pub fn store_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "store_read",
            "Read one record from a collection by key",
            json!({
                "type": "object",
                "properties": {
                    "collection": {"type": "string"},
                    "key": {"type": "string"}
                },
                "required": ["collection", "key"]
            }),
        ),
        ToolDefinition::new(
            "store_list",
            "List records in a collection matching field filters",
            json!({
                "type": "object",
                "properties": {
                    "collection": {"type": "string"},
                    "filters": {
                        "type": "object",
                        "description": "field name to required value",
                        "additionalProperties": {"type": "string"}
                    }
                },
                "required": ["collection"]
            }),
        ),
        ToolDefinition::new(
            "store_write",
            "Update fields on one record by key",
            json!({
                "type": "object",
                "properties": {
                    "collection": {"type": "string"},
                    "key": {"type": "string"},
                    "data": {"type": "object"}
                },
                "required": ["collection", "key", "data"]
            }),
        ),
    ]
}

fn str_param<'a>(input: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    input
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters(format!(
            "missing or non-string parameter '{name}'"
        )))
}

/// Execute one of the shared store tools. Returns `None` when the name is
/// not a shared store tool, so the agent's own handler can claim it.
pub async fn handle_store_tool(
    store: &RecordStoreClient,
    tool_name: &str,
    input: &Value,
) -> Option<Result<Value, ToolError>> {
    let result = match tool_name {
        "store_read" => read_tool(store, input).await,
        "store_list" => list_tool(store, input).await,
        "store_write" => write_tool(store, input).await,
        _ => return None,
    };
    Some(result)
}

async fn read_tool(store: &RecordStoreClient, input: &Value) -> Result<Value, ToolError> {
    let collection = str_param(input, "collection")?;
    let key = str_param(input, "key")?;
    Ok(store.get(collection, key).await?)
}

async fn list_tool(store: &RecordStoreClient, input: &Value) -> Result<Value, ToolError> {
    let collection = str_param(input, "collection")?;
    let filters: Vec<(String, String)> = input
        .get("filters")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let borrowed: Vec<(&str, &str)> = filters
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let items = store.list(collection, &borrowed).await?;
    Ok(Value::Array(items))
}

async fn write_tool(store: &RecordStoreClient, input: &Value) -> Result<Value, ToolError> {
    let collection = str_param(input, "collection")?;
    let key = str_param(input, "key")?;
    let data = input
        .get("data")
        .cloned()
        .ok_or_else(|| ToolError::InvalidParameters("missing parameter 'data'".to_string()))?;
    Ok(store.update(collection, key, data).await?)
}

/// Build a draft result for a sensitive tool: the proposed action is stored
/// as a pending workflow record, never executed directly.
pub async fn draft_action(
    store: &RecordStoreClient,
    agent_type: &str,
    action: &str,
    details: Value,
) -> Result<Value, ToolError> {
    let workflow = json!({
        "agent_type": agent_type,
        "action": action,
        "details": details.clone(),
        "status": "pending_approval",
    });
    let created = store.create(WORKFLOWS_COLLECTION, workflow).await?;
    let workflow_id = created.get("id").cloned().unwrap_or(Value::Null);

    Ok(json!({
        "requires_approval": true,
        "action": action,
        "workflow_id": workflow_id,
        "details": details,
        "note": "Draft recorded; a human must approve before execution.",
    }))
}

/// True when a tool result carries the approval marker.
pub fn is_draft(result: &Value) -> bool {
    result
        .get("requires_approval")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_catalog_names_carry_prefix() {
        for def in store_tool_definitions() {
            assert!(def.name.starts_with("store_"));
        }
    }

    #[test]
    fn test_draft_marker_detection() {
        assert!(is_draft(&json!({"requires_approval": true, "action": "send"})));
        assert!(!is_draft(&json!({"requires_approval": false})));
        assert!(!is_draft(&json!({"action": "send"})));
    }

    #[test]
    fn test_str_param_rejects_non_strings() {
        let input = json!({"collection": 7});
        assert!(matches!(
            str_param(&input, "collection"),
            Err(ToolError::InvalidParameters(_))
        ));
        assert!(matches!(
            str_param(&input, "key"),
            Err(ToolError::InvalidParameters(_))
        ));
    }
}
