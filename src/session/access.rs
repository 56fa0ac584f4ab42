//! Access validation for data-store tool calls.
//!
//! Every tool call whose name carries the data-store prefix is checked
//! against the calling session's scope before it is executed. A denial is
//! not an error path for the conversation: the driver feeds the denial
//! text back to the model as the tool result so it can correct course.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::audit::{AuditEmitter, AuditRecord, AuditStatus};
use crate::error::SessionError;
use crate::session::SessionRegistry;
use crate::store::{LOGS_COLLECTION, PROMPTS_COLLECTION, WORKFLOWS_COLLECTION};

/// Tool-name prefix that marks a call as touching the record store.
pub const DATA_TOOL_PREFIX: &str = "store_";

/// Collections any agent may read regardless of session scope. Writes to
/// these collections are still scope-checked.
const READ_EXEMPT_COLLECTIONS: &[&str] =
    &[PROMPTS_COLLECTION, LOGS_COLLECTION, WORKFLOWS_COLLECTION];

/// Most offending ids quoted in a denial message.
const MAX_REPORTED_IDS: usize = 3;

/// Outcome of validating one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Allowed,
    Denied { reason: String },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Scope-checks data-store tool calls against the session registry.
pub struct AccessValidator {
    registry: Arc<SessionRegistry>,
    audit: AuditEmitter,
    /// When set, a session that reaches this many violations has all
    /// further data-store calls denied outright.
    violation_limit: Option<u32>,
}

impl AccessValidator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        audit: AuditEmitter,
        violation_limit: Option<u32>,
    ) -> Self {
        Self {
            registry,
            audit,
            violation_limit,
        }
    }

    /// Validate one tool call for a session.
    ///
    /// Returns `UnknownSession` if the session has already ended; a tool
    /// call arriving after `end_session` is a bug in the caller, not a
    /// policy denial.
    pub async fn validate(
        &self,
        session_id: Uuid,
        tool_name: &str,
        tool_input: &Value,
    ) -> Result<AccessDecision, SessionError> {
        // The session must exist before anything else is considered, even
        // for tools that never touch the record store.
        self.registry.with_session(session_id, |_| ()).await?;

        let Some(action) = tool_name.strip_prefix(DATA_TOOL_PREFIX) else {
            return Ok(AccessDecision::Allowed);
        };

        let collection = tool_input
            .get("collection")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if action == "read" && READ_EXEMPT_COLLECTIONS.contains(&collection.as_str()) {
            // Reads of shared config collections are always permitted.
            return Ok(AccessDecision::Allowed);
        }

        let requested = extract_record_ids(tool_input);

        let (decision, agent_type, violations) = self
            .registry
            .with_session(session_id, |session| {
                if let Some(limit) = self.violation_limit {
                    if session.violation_count >= limit {
                        return (
                            AccessDecision::Denied {
                                reason: format!(
                                    "ACCESS DENIED: session exceeded the violation limit ({limit}); \
                                     no further data-store access is permitted",
                                ),
                            },
                            session.agent_type.clone(),
                            session.violation_count,
                        );
                    }
                }

                let offending: Vec<&String> = requested
                    .iter()
                    .filter(|id| !session.allowed_record_ids.contains(*id))
                    .collect();

                if offending.is_empty() {
                    return (
                        AccessDecision::Allowed,
                        session.agent_type.clone(),
                        session.violation_count,
                    );
                }

                session.violation_count += 1;

                let mut shown: Vec<String> = offending
                    .iter()
                    .take(MAX_REPORTED_IDS)
                    .map(|id| id.to_string())
                    .collect();
                shown.sort();
                let suffix = if offending.len() > MAX_REPORTED_IDS {
                    format!(" (and {} more)", offending.len() - MAX_REPORTED_IDS)
                } else {
                    String::new()
                };

                let reason = format!(
                    "ACCESS DENIED: record id(s) [{}]{} are outside this session's scope. \
                     This task is authorized for record '{}' only.",
                    shown.join(", "),
                    suffix,
                    session.primary_record_id,
                );

                (
                    AccessDecision::Denied { reason },
                    session.agent_type.clone(),
                    session.violation_count,
                )
            })
            .await?;

        if let AccessDecision::Denied { reason } = &decision {
            tracing::warn!(
                session_id = %session_id,
                tool = tool_name,
                violations,
                "Access denied: {reason}"
            );
            self.audit.emit(
                AuditRecord::new(
                    &agent_type,
                    "security_violation",
                    &collection,
                    "",
                    AuditStatus::Blocked,
                )
                .with_error(reason),
            );
        }

        Ok(decision)
    }
}

/// Pull every record id a tool call refers to, across the input shapes
/// the store tools accept: `key`, `keys`, `data.id`, and `data[].id`.
fn extract_record_ids(input: &Value) -> Vec<String> {
    let mut ids = Vec::new();

    if let Some(key) = input.get("key").and_then(scalar_id) {
        ids.push(key);
    }

    if let Some(keys) = input.get("keys").and_then(Value::as_array) {
        ids.extend(keys.iter().filter_map(scalar_id));
    }

    match input.get("data") {
        Some(Value::Object(obj)) => {
            if let Some(id) = obj.get("id").and_then(scalar_id) {
                ids.push(id);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(id) = item.get("id").and_then(scalar_id) {
                    ids.push(id);
                }
            }
        }
        _ => {}
    }

    ids
}

/// Record keys may arrive as strings or bare numbers depending on how the
/// model fills the tool schema. Both forms must face the same scope check,
/// so scalars are normalized to their string spelling.
fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
