//! Task routing: webhook event → department agent → driven conversation.
//!
//! Direct routes (collection mappings, manual triggers) skip the LLM
//! entirely until the agent itself runs. Only events with no direct route
//! pay for a classification call, and only when the orchestrator is
//! enabled.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::agent::classifier::{Department, InboundEvent, TaskClassifier};
use crate::agent::client_services::ClientServicesAgent;
use crate::agent::descriptor::{DepartmentAgent, TaskContext};
use crate::agent::driver::ConversationDriver;
use crate::agent::email::EmailAgent;
use crate::agent::finance::FinanceAgent;
use crate::agent::marketing::MarketingAgent;
use crate::agent::prompts::{PromptCache, substitute_variables};
use crate::audit::{AuditEmitter, AuditRecord, AuditStatus};
use crate::availability::AvailabilityRegistry;
use crate::error::RouteError;
use crate::session::{SessionRegistry, SessionSummary};
use crate::store::{APPROVALS_COLLECTION, RecordStoreClient, WORKFLOWS_COLLECTION};

/// Collections with a fixed agent, no classification needed.
pub fn agent_type_for_collection(collection: &str) -> Option<&'static str> {
    match collection {
        "emails" => Some("email"),
        "leads" => Some("lead"),
        "project_trackers" | "tasks" | "milestones" => Some("tracker"),
        _ => None,
    }
}

/// Departments with a dedicated agent, after collapse.
fn agent_type_for_department(department: Department) -> Option<&'static str> {
    match department.collapse() {
        Department::Finance => Some("finance"),
        Department::Marketing => Some("marketing"),
        Department::ClientServices => Some("client_services"),
        _ => None,
    }
}

/// What a dispatch produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchReport {
    Completed {
        agent_type: String,
        session: SessionSummary,
        text: String,
        turns: u32,
        classification_fallback: bool,
    },
    PendingApproval {
        department: Department,
        prompt_id: Value,
        summary: String,
    },
}

/// Routes inbound events to department agents and drives them.
pub struct Dispatcher {
    agents: HashMap<&'static str, Arc<dyn DepartmentAgent>>,
    classifier: TaskClassifier,
    driver: ConversationDriver,
    prompts: Arc<PromptCache>,
    sessions: Arc<SessionRegistry>,
    availability: Arc<AvailabilityRegistry>,
    audit: AuditEmitter,
    store: Arc<RecordStoreClient>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: TaskClassifier,
        driver: ConversationDriver,
        prompts: Arc<PromptCache>,
        sessions: Arc<SessionRegistry>,
        availability: Arc<AvailabilityRegistry>,
        audit: AuditEmitter,
        store: Arc<RecordStoreClient>,
    ) -> Self {
        let email: Arc<dyn DepartmentAgent> = Arc::new(EmailAgent::new(store.clone()));
        let marketing: Arc<dyn DepartmentAgent> = Arc::new(MarketingAgent::new(store.clone()));
        let client_services: Arc<dyn DepartmentAgent> =
            Arc::new(ClientServicesAgent::new(store.clone()));
        let finance: Arc<dyn DepartmentAgent> = Arc::new(FinanceAgent::new(store.clone()));

        let mut agents: HashMap<&'static str, Arc<dyn DepartmentAgent>> = HashMap::new();
        agents.insert("email", email);
        agents.insert("finance", finance);
        agents.insert("marketing", marketing.clone());
        agents.insert("lead", marketing);
        agents.insert("client_services", client_services.clone());
        agents.insert("tracker", client_services);

        Self {
            agents,
            classifier,
            driver,
            prompts,
            sessions,
            availability,
            audit,
            store,
        }
    }

    /// Dispatch one inbound event. `agent_type_hint` comes from a manual
    /// trigger; webhook deliveries resolve through the collection mapping
    /// and fall back to classification.
    pub async fn dispatch(
        &self,
        event: InboundEvent,
        agent_type_hint: Option<&str>,
    ) -> Result<DispatchReport, RouteError> {
        if event.key.is_empty() {
            return Err(RouteError::MissingRecordId);
        }

        let direct = agent_type_hint
            .map(str::to_string)
            .or_else(|| agent_type_for_collection(&event.collection).map(str::to_string));

        let (agent_type, classification_fallback) = match direct {
            Some(agent_type) => (agent_type, false),
            None => match self.classify_route(&event).await? {
                Routed::Agent {
                    agent_type,
                    fallback,
                } => (agent_type.to_string(), fallback),
                Routed::PendingApproval(report) => return Ok(report),
            },
        };

        if !self.availability.is_enabled(&agent_type).await {
            return Err(RouteError::AgentDisabled(agent_type));
        }

        let agent = self
            .agents
            .get(agent_type.as_str())
            .cloned()
            .ok_or(RouteError::NoAgentForDepartment(Department::Unknown))?;

        self.run_agent(agent, &agent_type, event, classification_fallback)
            .await
    }

    /// Classification path for events with no direct route. The
    /// orchestrator's own availability gates the LLM call.
    async fn classify_route(&self, event: &InboundEvent) -> Result<Routed, RouteError> {
        if !self.availability.is_enabled("orchestrator").await {
            return Err(RouteError::AgentDisabled("orchestrator".to_string()));
        }

        let outcome = self.classifier.classify(event).await?;
        let classification = outcome.classification;

        if classification.requires_human_approval {
            let prompt = json!({
                "kind": "task_approval",
                "department": classification.department,
                "summary": classification.summary.clone(),
                "collection": event.collection.clone(),
                "item_id": event.key.clone(),
                "status": "pending",
            });
            let created = self
                .store
                .create(APPROVALS_COLLECTION, prompt)
                .await
                .unwrap_or(Value::Null);
            let prompt_id = created.get("id").cloned().unwrap_or(Value::Null);

            self.audit.emit(
                AuditRecord::new(
                    "orchestrator",
                    &event.event,
                    &event.collection,
                    &event.key,
                    AuditStatus::Completed,
                )
                .with_result("escalated for human approval"),
            );

            return Ok(Routed::PendingApproval(DispatchReport::PendingApproval {
                department: classification.department,
                prompt_id,
                summary: classification.summary,
            }));
        }

        let agent_type = agent_type_for_department(classification.department)
            .ok_or(RouteError::NoAgentForDepartment(classification.department))?;

        Ok(Routed::Agent {
            agent_type,
            fallback: outcome.fallback_applied,
        })
    }

    async fn run_agent(
        &self,
        agent: Arc<dyn DepartmentAgent>,
        agent_type: &str,
        event: InboundEvent,
        classification_fallback: bool,
    ) -> Result<DispatchReport, RouteError> {
        self.audit.emit(AuditRecord::new(
            agent_type,
            &event.event,
            &event.collection,
            &event.key,
            AuditStatus::Received,
        ));

        let session_id = self
            .sessions
            .create_session(agent_type, &event.key, &event.collection, HashSet::new())
            .await;

        let ctx = TaskContext {
            session_id,
            trigger_event: event.event.clone(),
            collection: event.collection.clone(),
            item_id: event.key.clone(),
            payload: event.payload.clone(),
        };

        let template = self
            .prompts
            .system_prompt(agent_type, agent.default_system_prompt())
            .await;
        let system_prompt = substitute_variables(
            &template,
            &json!({
                "trigger_event": &ctx.trigger_event,
                "collection": &ctx.collection,
                "item_id": &ctx.item_id,
                "payload": &ctx.payload,
            }),
        );

        self.audit.emit(AuditRecord::new(
            agent_type,
            &event.event,
            &event.collection,
            &event.key,
            AuditStatus::Processing,
        ));

        let started = std::time::Instant::now();
        let drive_result = self.driver.drive(agent.as_ref(), &system_prompt, &ctx).await;

        // The session ends regardless of how the drive went. An operator may
        // have force-ended it mid-drive; that must not swallow the outcome or
        // the lifecycle audit record, so a missing session is reported and
        // summarized from what the dispatcher already knows.
        let session = match self.sessions.end_session(session_id).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    "Session was already ended: {err}"
                );
                SessionSummary {
                    session_id,
                    agent_type: agent_type.to_string(),
                    primary_record_id: event.key.clone(),
                    duration: started.elapsed(),
                    violation_count: 0,
                }
            }
        };

        match drive_result {
            Ok(outcome) => {
                self.audit.emit(
                    AuditRecord::new(
                        agent_type,
                        &event.event,
                        &event.collection,
                        &event.key,
                        AuditStatus::Completed,
                    )
                    .with_result(&outcome.text),
                );
                Ok(DispatchReport::Completed {
                    agent_type: agent_type.to_string(),
                    session,
                    text: outcome.text,
                    turns: outcome.turns,
                    classification_fallback,
                })
            }
            Err(err) => {
                self.audit.emit(
                    AuditRecord::new(
                        agent_type,
                        &event.event,
                        &event.collection,
                        &event.key,
                        AuditStatus::Failed,
                    )
                    .with_error(err.to_string()),
                );
                Err(err.into())
            }
        }
    }

    /// Resolve a human's answer to a drafted action.
    ///
    /// Approve marks the drafted workflow record approved; execution of the
    /// approved action lives outside this service. Reject closes it.
    /// Edit is acknowledged and left pending for the operator to amend.
    pub async fn handle_approval(
        &self,
        prompt_id: &str,
        response: &str,
        context: &Value,
    ) -> Value {
        let workflow_id = context.get("workflow_id").and_then(Value::as_str);

        let (status, note) = match response {
            "approve" => ("approved", "draft approved for execution"),
            "reject" => ("rejected", "draft rejected"),
            "edit" => ("pending_edit", "edit requested; draft left pending"),
            other => {
                return json!({
                    "ok": false,
                    "error": format!("unknown approval response '{other}'"),
                });
            }
        };

        if let Some(workflow_id) = workflow_id {
            if let Err(err) = self
                .store
                .update(WORKFLOWS_COLLECTION, workflow_id, json!({"status": status}))
                .await
            {
                tracing::warn!(workflow_id, "Could not update workflow status: {err}");
            }
        }

        if let Err(err) = self
            .store
            .update(APPROVALS_COLLECTION, prompt_id, json!({"status": status}))
            .await
        {
            tracing::warn!(prompt_id, "Could not update approval prompt: {err}");
        }

        self.audit.emit(
            AuditRecord::new(
                "orchestrator",
                "approval_response",
                APPROVALS_COLLECTION,
                prompt_id,
                AuditStatus::Completed,
            )
            .with_result(note),
        );

        json!({"ok": true, "status": status, "note": note})
    }
}

enum Routed {
    Agent {
        agent_type: &'static str,
        fallback: bool,
    },
    PendingApproval(DispatchReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_mapping() {
        assert_eq!(agent_type_for_collection("emails"), Some("email"));
        assert_eq!(agent_type_for_collection("leads"), Some("lead"));
        assert_eq!(agent_type_for_collection("tasks"), Some("tracker"));
        assert_eq!(agent_type_for_collection("milestones"), Some("tracker"));
        assert_eq!(agent_type_for_collection("project_trackers"), Some("tracker"));
        assert_eq!(agent_type_for_collection("invoices"), None);
    }

    #[test]
    fn test_department_routing_collapses() {
        assert_eq!(agent_type_for_department(Department::Sales), Some("marketing"));
        assert_eq!(
            agent_type_for_department(Department::Production),
            Some("client_services")
        );
        assert_eq!(agent_type_for_department(Department::Unknown), None);
    }
}
