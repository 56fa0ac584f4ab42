//! End-to-end checks of the session registry + access validator pair.

use std::collections::HashSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

use warden::audit::{AuditEmitter, NullAuditSink};
use warden::error::SessionError;
use warden::session::{AccessDecision, AccessValidator, SessionRegistry};

fn setup(violation_limit: Option<u32>) -> (Arc<SessionRegistry>, AccessValidator) {
    let registry = Arc::new(SessionRegistry::new());
    let validator = AccessValidator::new(
        registry.clone(),
        AuditEmitter::new(Arc::new(NullAuditSink)),
        violation_limit,
    );
    (registry, validator)
}

async fn open_session(registry: &SessionRegistry, primary: &str) -> Uuid {
    registry
        .create_session("finance", primary, "invoices", HashSet::new())
        .await
}

fn denial_reason(decision: AccessDecision) -> String {
    match decision {
        AccessDecision::Denied { reason } => reason,
        AccessDecision::Allowed => panic!("expected a denial"),
    }
}

#[tokio::test]
async fn invoice_session_cannot_reach_a_second_invoice() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;

    let own = validator
        .validate(session, "store_write", &json!({"key": "INV-1"}))
        .await
        .unwrap();
    assert!(own.is_allowed());

    let other = validator
        .validate(session, "store_write", &json!({"key": "INV-2"}))
        .await
        .unwrap();
    let reason = denial_reason(other);
    assert!(reason.contains("ACCESS DENIED"), "got: {reason}");
    assert!(reason.contains("INV-2"));

    let summary = registry.end_session(session).await.unwrap();
    assert_eq!(summary.violation_count, 1);
    assert_eq!(summary.primary_record_id, "INV-1");
}

#[tokio::test]
async fn bare_numeric_keys_are_denied_like_string_keys() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;

    let decision = validator
        .validate(session, "store_write", &json!({"key": 123}))
        .await
        .unwrap();
    let reason = denial_reason(decision);
    assert!(reason.contains("123"), "got: {reason}");

    let summary = registry.end_session(session).await.unwrap();
    assert_eq!(summary.violation_count, 1);
}

#[tokio::test]
async fn violation_count_matches_denied_attempts_exactly() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;

    for n in 0..5 {
        let decision = validator
            .validate(session, "store_write", &json!({"key": format!("OTHER-{n}")}))
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }
    // Allowed calls never move the counter.
    for _ in 0..3 {
        let decision = validator
            .validate(session, "store_read", &json!({"collection": "invoices", "key": "INV-1"}))
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    let summary = registry.end_session(session).await.unwrap();
    assert_eq!(summary.violation_count, 5);
}

#[tokio::test]
async fn validation_after_end_session_reports_unknown_session() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;
    registry.end_session(session).await.unwrap();

    let err = validator
        .validate(session, "store_write", &json!({"key": "INV-1"}))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::UnknownSession(session));
}

#[tokio::test]
async fn shared_collections_are_readable_but_not_writable_out_of_scope() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;

    for collection in ["service_prompts", "agent_logs", "service_workflows"] {
        let read = validator
            .validate(
                session,
                "store_read",
                &json!({"collection": collection, "key": "anything"}),
            )
            .await
            .unwrap();
        assert!(read.is_allowed(), "reads of {collection} should pass");

        let write = validator
            .validate(
                session,
                "store_write",
                &json!({"collection": collection, "key": "anything", "data": {}}),
            )
            .await
            .unwrap();
        assert!(!write.is_allowed(), "writes to {collection} still scoped");
    }

    let summary = registry.end_session(session).await.unwrap();
    assert_eq!(summary.violation_count, 3);
}

#[tokio::test]
async fn tools_outside_the_store_namespace_are_not_scoped() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;

    let decision = validator
        .validate(session, "schedule_payment", &json!({"key": "INV-999"}))
        .await
        .unwrap();
    assert!(decision.is_allowed());

    let summary = registry.end_session(session).await.unwrap();
    assert_eq!(summary.violation_count, 0);
}

#[tokio::test]
async fn batch_calls_are_denied_when_any_id_is_out_of_scope() {
    let (registry, validator) = setup(None);
    let session = registry
        .create_session(
            "finance",
            "INV-1",
            "invoices",
            HashSet::from(["INV-2".to_string()]),
        )
        .await;

    let mixed = validator
        .validate(session, "store_write", &json!({"keys": ["INV-1", "INV-2", "INV-3"]}))
        .await
        .unwrap();
    let reason = denial_reason(mixed);
    assert!(reason.contains("INV-3"));
    assert!(!reason.contains("INV-2"), "in-scope ids are not reported");
}

#[tokio::test]
async fn granted_records_join_the_scope() {
    let (registry, validator) = setup(None);
    let session = open_session(&registry, "INV-1").await;

    assert!(
        !validator
            .validate(session, "store_write", &json!({"key": "INV-2"}))
            .await
            .unwrap()
            .is_allowed()
    );

    registry.grant_access(session, "INV-2").await.unwrap();

    assert!(
        validator
            .validate(session, "store_write", &json!({"key": "INV-2"}))
            .await
            .unwrap()
            .is_allowed()
    );
}

#[tokio::test]
async fn violation_limit_cuts_off_the_session() {
    let (registry, validator) = setup(Some(3));
    let session = open_session(&registry, "INV-1").await;

    for _ in 0..3 {
        validator
            .validate(session, "store_write", &json!({"key": "INV-2"}))
            .await
            .unwrap();
    }

    let in_scope = validator
        .validate(session, "store_write", &json!({"key": "INV-1"}))
        .await
        .unwrap();
    let reason = denial_reason(in_scope);
    assert!(reason.contains("violation limit"));

    // The lockout denial does not itself grow the counter.
    let summary = registry.end_session(session).await.unwrap();
    assert_eq!(summary.violation_count, 3);
}

#[tokio::test]
async fn sessions_are_isolated_from_each_other() {
    let (registry, validator) = setup(None);
    let a = open_session(&registry, "INV-A").await;
    let b = open_session(&registry, "INV-B").await;

    assert!(
        validator
            .validate(a, "store_write", &json!({"key": "INV-A"}))
            .await
            .unwrap()
            .is_allowed()
    );
    assert!(
        !validator
            .validate(b, "store_write", &json!({"key": "INV-A"}))
            .await
            .unwrap()
            .is_allowed()
    );

    assert_eq!(registry.end_session(a).await.unwrap().violation_count, 0);
    assert_eq!(registry.end_session(b).await.unwrap().violation_count, 1);
}
