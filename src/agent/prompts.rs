//! System-prompt overrides, cached from the record store.
//!
//! Operators can override an agent's system prompt by writing a row into
//! the `service_prompts` collection. Overrides are cached with a TTL;
//! anything that fails to resolve falls back to the descriptor's built-in
//! prompt so a store outage never blocks dispatch.
//!
//! Prompts are templates: `{{name}}` placeholders are filled per task from
//! the dispatch context, after the cache lookup, so one cached template
//! serves every task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::store::{PROMPTS_COLLECTION, RecordStoreClient};

const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CachedPrompt {
    text: String,
    fetched_at: Instant,
}

pub struct PromptCache {
    store: Arc<RecordStoreClient>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedPrompt>>,
}

impl PromptCache {
    pub fn new(store: Arc<RecordStoreClient>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<RecordStoreClient>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the system prompt for an agent: cached override if fresh,
    /// then the store, then the built-in default.
    pub async fn system_prompt(&self, agent_type: &str, default: &str) -> String {
        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries.get(agent_type) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.text.clone();
                }
            }
        }

        let text = match self.fetch_override(agent_type).await {
            Some(text) => text,
            None => default.to_string(),
        };

        self.entries.lock().await.insert(
            agent_type.to_string(),
            CachedPrompt {
                text: text.clone(),
                fetched_at: Instant::now(),
            },
        );

        text
    }

    /// Drop all cached prompts so the next lookup hits the store.
    pub async fn invalidate(&self) {
        self.entries.lock().await.clear();
    }

    async fn fetch_override(&self, agent_type: &str) -> Option<String> {
        let rows = match self
            .store
            .list(PROMPTS_COLLECTION, &[("agent_type", agent_type)])
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(agent_type, "Prompt override fetch failed, using default: {err}");
                return None;
            }
        };

        rows.iter()
            .find(|row| {
                row.get("enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true)
            })
            .and_then(|row| row.get("prompt").and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Fill `{{name}}` placeholders in a prompt template from `context`.
///
/// Dotted names traverse nested objects (`{{payload.subject}}`). A name
/// that resolves to nothing is rendered as `{{MISSING:name}}` so the gap
/// is visible in the final prompt instead of silently vanishing. Brace
/// pairs whose content is not a plain name are left untouched.
pub fn substitute_variables(prompt: &str, context: &Value) -> String {
    let mut out = String::with_capacity(prompt.len());
    let mut rest = prompt;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        let name = &rest[start + 2..start + 2 + end];
        out.push_str(&rest[..start]);
        let is_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if is_name {
            out.push_str(&lookup_variable(context, name));
        } else {
            out.push_str("{{");
            out.push_str(name);
            out.push_str("}}");
        }
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    out
}

fn lookup_variable(context: &Value, name: &str) -> String {
    let mut current = context;
    for key in name.split('.') {
        match current.get(key) {
            Some(value) => current = value,
            None => return format!("{{{{MISSING:{name}}}}}"),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitutes_flat_and_nested_names() {
        let ctx = json!({
            "item_id": "MSG-1",
            "payload": {"subject": "Quarterly numbers"}
        });
        let prompt = "Work on {{item_id}}: {{payload.subject}}.";
        assert_eq!(
            substitute_variables(prompt, &ctx),
            "Work on MSG-1: Quarterly numbers."
        );
    }

    #[test]
    fn test_unresolved_names_are_marked() {
        let ctx = json!({"item_id": "MSG-1"});
        assert_eq!(
            substitute_variables("See {{payload.subject}}", &ctx),
            "See {{MISSING:payload.subject}}"
        );
    }

    #[test]
    fn test_non_name_braces_pass_through() {
        let ctx = json!({});
        let prompt = r#"Reply with {{"ok": true}} verbatim."#;
        assert_eq!(substitute_variables(prompt, &ctx), prompt);
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let ctx = json!({"payload": {"amount": 120}});
        assert_eq!(
            substitute_variables("Amount: {{payload.amount}}", &ctx),
            "Amount: 120"
        );
    }
}
