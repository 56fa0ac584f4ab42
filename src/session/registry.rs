//! Session registry: time-boxed authorization scopes for agent tasks.
//!
//! A session binds one agent invocation to the record(s) it was dispatched
//! for. Sessions live only in process memory; a restart drops them all,
//! which is deliberate - a session's lifetime is bounded by one task's
//! conversation, not a durable transaction.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::SessionError;

/// One active authorization scope.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub agent_type: String,
    pub primary_record_id: String,
    /// Record ids this session may touch. Never empty, never shrinks.
    pub allowed_record_ids: HashSet<String>,
    pub allowed_collections: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub violation_count: u32,
}

/// Immutable summary returned when a session is retired.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub agent_type: String,
    pub primary_record_id: String,
    pub duration: Duration,
    pub violation_count: u32,
}

/// Monitoring snapshot of one active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub agent_type: String,
    pub primary_record_id: String,
    pub violation_count: u32,
    pub age_secs: u64,
}

/// Issues and retires sessions. Shared across concurrent task flows.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a new session scoped to the primary record plus any extra ids.
    ///
    /// Always succeeds; the scope always contains at least the primary id.
    pub async fn create_session(
        &self,
        agent_type: &str,
        primary_record_id: &str,
        collection: &str,
        additional_ids: HashSet<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();

        let mut allowed_record_ids = additional_ids;
        allowed_record_ids.insert(primary_record_id.to_string());

        let session = Session {
            id,
            agent_type: agent_type.to_string(),
            primary_record_id: primary_record_id.to_string(),
            allowed_record_ids,
            allowed_collections: HashSet::from([collection.to_string()]),
            created_at: Utc::now(),
            violation_count: 0,
        };

        self.sessions.lock().await.insert(id, session);

        tracing::info!(
            session_id = %id,
            agent_type,
            primary = primary_record_id,
            "Session created"
        );

        id
    }

    /// Retire a session and return its summary.
    ///
    /// Fails with `UnknownSession` when called twice or on an unknown id;
    /// idempotency is the caller's responsibility.
    pub async fn end_session(&self, id: Uuid) -> Result<SessionSummary, SessionError> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(&id)
            .ok_or(SessionError::UnknownSession(id))?;

        let elapsed = Utc::now() - session.created_at;
        let duration = elapsed.to_std().unwrap_or_default();

        tracing::info!(
            session_id = %id,
            violations = session.violation_count,
            duration_secs = duration.as_secs(),
            "Session ended"
        );

        Ok(SessionSummary {
            session_id: id,
            agent_type: session.agent_type,
            primary_record_id: session.primary_record_id,
            duration,
            violation_count: session.violation_count,
        })
    }

    /// Widen a session's scope with one more record id. Scopes only grow.
    pub async fn grant_access(&self, id: Uuid, record_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.allowed_record_ids.insert(record_id.to_string());
        Ok(())
    }

    /// Run a closure against a session under the registry lock.
    ///
    /// Used by the access validator so the id check and the violation
    /// counter update happen atomically.
    pub(crate) async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        Ok(f(session))
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Monitoring snapshot of all active sessions.
    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let now = Utc::now();
        self.sessions
            .lock()
            .await
            .values()
            .map(|s| SessionInfo {
                session_id: s.id,
                agent_type: s.agent_type.clone(),
                primary_record_id: s.primary_record_id.clone(),
                violation_count: s.violation_count,
                age_secs: (now - s.created_at).num_seconds().max(0) as u64,
            })
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_seeds_primary_id() {
        let registry = SessionRegistry::new();
        let id = registry
            .create_session("finance", "INV-1", "invoices", HashSet::new())
            .await;

        let allowed = registry
            .with_session(id, |s| s.allowed_record_ids.clone())
            .await
            .unwrap();
        assert!(allowed.contains("INV-1"));
        assert_eq!(allowed.len(), 1);
    }

    #[tokio::test]
    async fn test_additional_ids_joined_with_primary() {
        let registry = SessionRegistry::new();
        let extra = HashSet::from(["A".to_string(), "B".to_string()]);
        let id = registry
            .create_session("finance", "INV-1", "invoices", extra)
            .await;

        let allowed = registry
            .with_session(id, |s| s.allowed_record_ids.clone())
            .await
            .unwrap();
        assert_eq!(allowed.len(), 3);
    }

    #[tokio::test]
    async fn test_end_session_is_not_idempotent() {
        let registry = SessionRegistry::new();
        let id = registry
            .create_session("finance", "INV-1", "invoices", HashSet::new())
            .await;

        let summary = registry.end_session(id).await.unwrap();
        assert_eq!(summary.agent_type, "finance");
        assert_eq!(summary.violation_count, 0);

        assert_eq!(
            registry.end_session(id).await.unwrap_err(),
            SessionError::UnknownSession(id)
        );
    }

    #[tokio::test]
    async fn test_grant_access_grows_scope() {
        let registry = SessionRegistry::new();
        let id = registry
            .create_session("email", "MSG-1", "emails", HashSet::new())
            .await;

        registry.grant_access(id, "MSG-2").await.unwrap();
        let allowed = registry
            .with_session(id, |s| s.allowed_record_ids.clone())
            .await
            .unwrap();
        assert!(allowed.contains("MSG-1"));
        assert!(allowed.contains("MSG-2"));
    }
}
