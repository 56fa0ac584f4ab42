//! Agent availability: runtime on/off switches per agent type.
//!
//! Toggles take effect synchronously in memory; persistence to the store's
//! `agent_settings` collection is best-effort and never blocks a toggle.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::store::{RecordStoreClient, SETTINGS_COLLECTION};

/// Every agent type the service knows how to run.
pub const KNOWN_AGENTS: &[&str] = &[
    "orchestrator",
    "email",
    "lead",
    "tracker",
    "finance",
    "marketing",
    "client_services",
];

pub struct AvailabilityRegistry {
    state: Mutex<HashMap<String, bool>>,
    store: Option<Arc<RecordStoreClient>>,
}

impl AvailabilityRegistry {
    /// Registry with every known agent enabled and store persistence.
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self {
            state: Mutex::new(all_enabled()),
            store: Some(store),
        }
    }

    /// In-memory-only registry, for tests.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(all_enabled()),
            store: None,
        }
    }

    /// Load persisted toggles from the store. Any failure leaves the
    /// all-enabled default in place.
    pub async fn hydrate(&self) {
        let Some(store) = &self.store else { return };

        let rows = match store.list(SETTINGS_COLLECTION, &[]).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!("Could not load agent settings, all agents enabled: {err}");
                return;
            }
        };

        let mut state = self.state.lock().await;
        for row in rows {
            let Some(agent_type) = row.get("agent_type").and_then(Value::as_str) else {
                continue;
            };
            if !state.contains_key(agent_type) {
                continue;
            }
            let enabled = row.get("enabled").and_then(Value::as_bool).unwrap_or(true);
            state.insert(agent_type.to_string(), enabled);
        }
        tracing::info!(agents = state.len(), "Agent availability hydrated");
    }

    /// Whether an agent may be dispatched. Unknown agent types are never
    /// available.
    pub async fn is_enabled(&self, agent_type: &str) -> bool {
        self.state
            .lock()
            .await
            .get(agent_type)
            .copied()
            .unwrap_or(false)
    }

    /// Set one agent's flag. Returns the new value, or `None` for an
    /// unknown agent type.
    pub async fn set_enabled(&self, agent_type: &str, enabled: bool) -> Option<bool> {
        {
            let mut state = self.state.lock().await;
            if !state.contains_key(agent_type) {
                return None;
            }
            state.insert(agent_type.to_string(), enabled);
        }
        self.persist(agent_type, enabled);
        Some(enabled)
    }

    /// Flip one agent's flag. Returns the new value, or `None` for an
    /// unknown agent type.
    pub async fn toggle(&self, agent_type: &str) -> Option<bool> {
        let new_value = {
            let mut state = self.state.lock().await;
            let current = *state.get(agent_type)?;
            state.insert(agent_type.to_string(), !current);
            !current
        };
        self.persist(agent_type, new_value);
        Some(new_value)
    }

    pub async fn set_all(&self, enabled: bool) {
        let agents: Vec<String> = {
            let mut state = self.state.lock().await;
            for value in state.values_mut() {
                *value = enabled;
            }
            state.keys().cloned().collect()
        };
        for agent in agents {
            self.persist(&agent, enabled);
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, bool> {
        self.state.lock().await.clone()
    }

    /// Fire-and-forget write-through to the settings collection.
    fn persist(&self, agent_type: &str, enabled: bool) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let agent_type = agent_type.to_string();
        tokio::spawn(async move {
            let data = json!({"enabled": enabled});
            if let Err(err) = store.update(SETTINGS_COLLECTION, &agent_type, data).await {
                tracing::warn!(agent_type, "Could not persist availability: {err}");
            }
        });
    }
}

fn all_enabled() -> HashMap<String, bool> {
    KNOWN_AGENTS
        .iter()
        .map(|name| (name.to_string(), true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_to_all_enabled() {
        let registry = AvailabilityRegistry::in_memory();
        for agent in KNOWN_AGENTS {
            assert!(registry.is_enabled(agent).await, "{agent} should start enabled");
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_is_never_enabled() {
        let registry = AvailabilityRegistry::in_memory();
        assert!(!registry.is_enabled("intruder").await);
        assert!(registry.set_enabled("intruder", true).await.is_none());
        assert!(registry.toggle("intruder").await.is_none());
    }

    #[tokio::test]
    async fn test_toggle_flips_and_reports() {
        let registry = AvailabilityRegistry::in_memory();
        assert_eq!(registry.toggle("finance").await, Some(false));
        assert!(!registry.is_enabled("finance").await);
        assert_eq!(registry.toggle("finance").await, Some(true));
    }

    #[tokio::test]
    async fn test_set_all() {
        let registry = AvailabilityRegistry::in_memory();
        registry.set_all(false).await;
        assert!(!registry.is_enabled("email").await);
        registry.set_all(true).await;
        assert!(registry.is_enabled("email").await);
    }
}
