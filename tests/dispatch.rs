//! Dispatch flow tests with a deterministic, call-counting LLM stub.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;

use warden::agent::{ConversationDriver, DepartmentAgent, EmailAgent, TaskContext};
use warden::audit::{AuditEmitter, NullAuditSink};
use warden::config::{Config, LlmConfig, ServerConfig, SessionConfig, StoreConfig};
use warden::context::ServiceContext;
use warden::error::{DriverError, LlmError, RouteError};
use warden::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, TokenUsage, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};
use warden::session::{AccessValidator, SessionRegistry};
use warden::store::RecordStoreClient;
use warden::{DispatchReport, InboundEvent};

/// Scripted LLM: hands out queued responses and records what it was asked.
struct StubLlm {
    completions: Mutex<VecDeque<String>>,
    tool_responses: Mutex<VecDeque<ToolCompletionResponse>>,
    complete_calls: AtomicU32,
    tool_complete_calls: AtomicU32,
    recorded: Mutex<Vec<ToolCompletionRequest>>,
}

impl StubLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            completions: Mutex::new(VecDeque::new()),
            tool_responses: Mutex::new(VecDeque::new()),
            complete_calls: AtomicU32::new(0),
            tool_complete_calls: AtomicU32::new(0),
            recorded: Mutex::new(Vec::new()),
        })
    }

    fn queue_completion(&self, text: &str) {
        self.completions.lock().unwrap().push_back(text.to_string());
    }

    fn queue_tool_use(&self, name: &str, arguments: serde_json::Value) {
        self.tool_responses
            .lock()
            .unwrap()
            .push_back(ToolCompletionResponse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: format!("call_{name}"),
                    name: name.to_string(),
                    arguments,
                }],
                finish_reason: FinishReason::ToolUse,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            });
    }

    fn queue_stop(&self, text: &str) {
        self.tool_responses
            .lock()
            .unwrap()
            .push_back(ToolCompletionResponse {
                content: Some(text.to_string()),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            });
    }

    fn total_calls(&self) -> u32 {
        self.complete_calls.load(Ordering::SeqCst) + self.tool_complete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let content =
            self.completions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::InvalidResponse {
                    reason: "stub completion queue empty".to_string(),
                })?;
        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }

    async fn complete_with_tools(
        &self,
        req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.tool_complete_calls.fetch_add(1, Ordering::SeqCst);
        self.recorded.lock().unwrap().push(req);
        self.tool_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::InvalidResponse {
                reason: "stub tool response queue empty".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            webhook_secret: None,
        },
        llm: LlmConfig {
            base_url: "http://localhost:9".to_string(),
            api_key: SecretString::from("test-key".to_string()),
            model: "stub".to_string(),
            max_tokens: 1024,
            max_turns: 10,
            timeout: std::time::Duration::from_secs(5),
        },
        store: StoreConfig {
            // port 9 (discard) so accidental store traffic fails fast
            base_url: "http://localhost:9".to_string(),
            token: SecretString::from("test-token".to_string()),
        },
        session: SessionConfig {
            violation_limit: None,
        },
    }
}

fn test_context(llm: Arc<StubLlm>) -> Arc<ServiceContext> {
    let config = test_config();
    let store = Arc::new(RecordStoreClient::new(config.store.clone()));
    ServiceContext::with_components(config, llm, store)
}

fn driver_fixture(llm: Arc<StubLlm>) -> (ConversationDriver, Arc<SessionRegistry>, EmailAgent) {
    let registry = Arc::new(SessionRegistry::new());
    let validator = Arc::new(AccessValidator::new(
        registry.clone(),
        AuditEmitter::new(Arc::new(NullAuditSink)),
        None,
    ));
    let config = test_config();
    let driver = ConversationDriver::new(llm, validator, 10, 1024);
    let store = Arc::new(RecordStoreClient::new(config.store.clone()));
    (driver, registry, EmailAgent::new(store))
}

async fn email_task(registry: &SessionRegistry) -> TaskContext {
    let session_id = registry
        .create_session("email", "MSG-1", "emails", HashSet::new())
        .await;
    TaskContext {
        session_id,
        trigger_event: "items.create".to_string(),
        collection: "emails".to_string(),
        item_id: "MSG-1".to_string(),
        payload: json!({"subject": "Hello"}),
    }
}

#[tokio::test]
async fn turn_budget_is_enforced_at_exactly_max_turns() {
    let llm = StubLlm::new();
    // Eleven tool turns queued; only ten may ever be consumed.
    for _ in 0..11 {
        llm.queue_tool_use("ponder", json!({}));
    }

    let (driver, registry, agent) = driver_fixture(llm.clone());
    let ctx = email_task(&registry).await;

    let err = driver
        .drive(&agent, agent.default_system_prompt(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::TurnBudgetExceeded(10)));
    assert_eq!(llm.total_calls(), 10);
}

#[tokio::test]
async fn denied_store_call_is_surfaced_to_the_model() {
    let llm = StubLlm::new();
    llm.queue_tool_use(
        "store_write",
        json!({"collection": "emails", "key": "MSG-2", "data": {"status": "read"}}),
    );
    llm.queue_stop("Understood, staying on MSG-1.");

    let (driver, registry, agent) = driver_fixture(llm.clone());
    let ctx = email_task(&registry).await;

    let outcome = driver
        .drive(&agent, agent.default_system_prompt(), &ctx)
        .await
        .unwrap();
    assert_eq!(outcome.text, "Understood, staying on MSG-1.");
    assert_eq!(outcome.turns, 2);

    // The second request's transcript ends with the denial as a tool result.
    let recorded = llm.recorded.lock().unwrap();
    let second = &recorded[1];
    let last = second.messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert!(last.content.contains("ACCESS DENIED"), "got: {}", last.content);
    assert!(last.content.contains("MSG-2"));

    // The denied write never executed, and the session recorded it.
    let summary = registry.end_session(ctx.session_id).await.unwrap();
    assert_eq!(summary.violation_count, 1);
}

#[tokio::test]
async fn unknown_tool_names_are_reported_not_fatal() {
    let llm = StubLlm::new();
    llm.queue_tool_use("format_hard_drive", json!({}));
    llm.queue_stop("Never mind.");

    let (driver, registry, agent) = driver_fixture(llm.clone());
    let ctx = email_task(&registry).await;

    let outcome = driver
        .drive(&agent, agent.default_system_prompt(), &ctx)
        .await
        .unwrap();
    assert_eq!(outcome.text, "Never mind.");

    let recorded = llm.recorded.lock().unwrap();
    let last = recorded[1].messages.last().unwrap();
    assert!(last.content.contains("Unknown tool"));
}

#[tokio::test]
async fn disabled_agent_short_circuits_before_any_llm_call() {
    let llm = StubLlm::new();
    let ctx = test_context(llm.clone());
    let disabled = ctx.availability.set_enabled("finance", false).await;
    assert_eq!(disabled, Some(false));

    let event = InboundEvent {
        event: "manual_trigger".to_string(),
        collection: "invoices".to_string(),
        key: "INV-1".to_string(),
        payload: json!({}),
    };
    let err = ctx
        .dispatcher
        .dispatch(event, Some("finance"))
        .await
        .unwrap_err();

    assert!(matches!(err, RouteError::AgentDisabled(ref a) if a == "finance"));
    assert_eq!(llm.total_calls(), 0);
    assert_eq!(ctx.sessions.active_count().await, 0);
}

#[tokio::test]
async fn classification_routes_prose_wrapped_json_to_the_right_agent() {
    let llm = StubLlm::new();
    llm.queue_completion(
        "Looking at this event, it is clearly billing work.\n\
         ```json\n\
         {\"department\": \"finance\", \"priority\": \"high\",\n\
          \"task_type\": \"invoice_review\", \"requires_human_approval\": false,\n\
          \"complexity\": \"simple\", \"secondary_departments\": null,\n\
          \"summary\": \"Review invoice INV-77\"}\n\
         ```",
    );
    llm.queue_stop("Invoice reviewed.");

    let ctx = test_context(llm.clone());
    let event = InboundEvent {
        event: "items.create".to_string(),
        collection: "invoices".to_string(),
        key: "INV-77".to_string(),
        payload: json!({"amount": 120}),
    };

    let report = ctx.dispatcher.dispatch(event, None).await.unwrap();
    match report {
        DispatchReport::Completed {
            agent_type,
            session,
            text,
            classification_fallback,
            ..
        } => {
            assert_eq!(agent_type, "finance");
            assert_eq!(text, "Invoice reviewed.");
            assert_eq!(session.primary_record_id, "INV-77");
            assert!(!classification_fallback);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(llm.complete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn classification_is_deterministic_for_identical_replies() {
    let llm = StubLlm::new();
    let reply = r#"{"department": "marketing", "priority": "low",
        "task_type": "lead_intake", "requires_human_approval": false,
        "complexity": "simple", "secondary_departments": null,
        "summary": "New lead"}"#;
    llm.queue_completion(reply);
    llm.queue_completion(reply);

    let classifier = warden::agent::TaskClassifier::new(llm.clone());
    let event = InboundEvent {
        event: "items.create".to_string(),
        collection: "leads".to_string(),
        key: "LEAD-1".to_string(),
        payload: json!({"name": "Ada"}),
    };

    let first = classifier.classify(&event).await.unwrap();
    let second = classifier.classify(&event).await.unwrap();
    assert_eq!(
        first.classification.department,
        second.classification.department
    );
    assert_eq!(first.classification.priority, second.classification.priority);
    assert!(!first.fallback_applied);
}

#[tokio::test]
async fn undecodable_classification_falls_back_to_human_approval() {
    let llm = StubLlm::new();
    llm.queue_completion("I am not sure what to do with this one.");

    let ctx = test_context(llm.clone());
    let event = InboundEvent {
        event: "items.create".to_string(),
        collection: "mystery_collection".to_string(),
        key: "X-1".to_string(),
        payload: json!({}),
    };

    let report = ctx.dispatcher.dispatch(event, None).await.unwrap();
    match report {
        DispatchReport::PendingApproval { summary, .. } => {
            assert!(summary.contains("mystery_collection"));
        }
        other => panic!("expected approval escalation, got {other:?}"),
    }
    // Only the classification call happened; no agent was driven.
    assert_eq!(llm.total_calls(), 1);
    assert_eq!(ctx.sessions.active_count().await, 0);
}

#[tokio::test]
async fn missing_record_key_is_rejected_up_front() {
    let llm = StubLlm::new();
    let ctx = test_context(llm.clone());

    let event = InboundEvent {
        event: "items.create".to_string(),
        collection: "emails".to_string(),
        key: String::new(),
        payload: json!({}),
    };
    let err = ctx.dispatcher.dispatch(event, None).await.unwrap_err();
    assert!(matches!(err, RouteError::MissingRecordId));
    assert_eq!(llm.total_calls(), 0);
}

/// Ends every active session before replying, as an operator force-end
/// through the admin surface would mid-drive.
struct ForceEndingLlm {
    sessions: Mutex<Option<Arc<SessionRegistry>>>,
}

#[async_trait]
impl LlmProvider for ForceEndingLlm {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::InvalidResponse {
            reason: "unexpected completion call".to_string(),
        })
    }

    async fn complete_with_tools(
        &self,
        _req: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let registry = self.sessions.lock().unwrap().clone();
        if let Some(registry) = registry {
            for info in registry.snapshot().await {
                let _ = registry.end_session(info.session_id).await;
            }
        }
        Ok(ToolCompletionResponse {
            content: Some("Handled before shutdown.".to_string()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

#[tokio::test]
async fn force_ended_session_does_not_discard_a_finished_drive() {
    let llm = Arc::new(ForceEndingLlm {
        sessions: Mutex::new(None),
    });
    let config = test_config();
    let store = Arc::new(RecordStoreClient::new(config.store.clone()));
    let ctx = ServiceContext::with_components(config, llm.clone(), store);
    *llm.sessions.lock().unwrap() = Some(ctx.sessions.clone());

    let event = InboundEvent {
        event: "items.create".to_string(),
        collection: "emails".to_string(),
        key: "MSG-5".to_string(),
        payload: json!({}),
    };
    let report = ctx.dispatcher.dispatch(event, None).await.unwrap();
    match report {
        DispatchReport::Completed { text, session, .. } => {
            assert_eq!(text, "Handled before shutdown.");
            assert_eq!(session.primary_record_id, "MSG-5");
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(ctx.sessions.active_count().await, 0);
}

#[tokio::test]
async fn sessions_always_end_even_when_the_drive_fails() {
    let llm = StubLlm::new();
    // Empty queue: the first tool completion fails as a transport error.
    let ctx = test_context(llm.clone());

    let event = InboundEvent {
        event: "items.create".to_string(),
        collection: "emails".to_string(),
        key: "MSG-9".to_string(),
        payload: json!({}),
    };
    let err = ctx.dispatcher.dispatch(event, None).await.unwrap_err();
    assert!(matches!(err, RouteError::Driver(_)));
    assert_eq!(ctx.sessions.active_count().await, 0);
}
