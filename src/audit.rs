//! Audit log emission.
//!
//! Every task state transition and every blocked tool call is appended to
//! the store's `agent_logs` collection. Emission is fire-and-forget: an
//! unreachable log collection must never fail the task or the validator.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{LOGS_COLLECTION, RecordStoreClient};

/// Lifecycle status of an audited task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Received,
    Processing,
    Completed,
    Failed,
    Blocked,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub agent_type: String,
    pub trigger_event: String,
    pub collection: String,
    pub item_id: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        agent_type: impl Into<String>,
        trigger_event: impl Into<String>,
        collection: impl Into<String>,
        item_id: impl Into<String>,
        status: AuditStatus,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            trigger_event: trigger_event.into(),
            collection: collection.into(),
            item_id: item_id.into(),
            status,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record. Implementations swallow and log their own failures.
    async fn append(&self, record: AuditRecord);
}

/// Sink that writes records into the record store's log collection.
pub struct StoreAuditSink {
    store: Arc<RecordStoreClient>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn append(&self, record: AuditRecord) {
        let data = match serde_json::to_value(&record) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to serialize audit record: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.create(LOGS_COLLECTION, data).await {
            tracing::warn!(
                agent_type = %record.agent_type,
                status = ?record.status,
                "Failed to write audit record: {}",
                e
            );
        }
    }
}

/// Sink that drops all records. Used in tests.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn append(&self, _record: AuditRecord) {}
}

/// Fire-and-forget audit emitter.
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Emit a record asynchronously. Never blocks the caller.
    pub fn emit(&self, record: AuditRecord) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.append(record).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_status_wire_form() {
        let json = serde_json::to_string(&AuditStatus::Blocked).unwrap();
        assert_eq!(json, "\"blocked\"");
    }

    #[test]
    fn test_record_skips_empty_fields() {
        let record = AuditRecord::new("finance", "items.create", "invoices", "INV-1", AuditStatus::Received);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "received");
    }
}
