//! Task classification: one LLM round trip, strict JSON decoding.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClassifyError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Business department a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Finance,
    Marketing,
    ClientServices,
    Production,
    Sales,
    Operations,
    Unknown,
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Department::Finance => "finance",
            Department::Marketing => "marketing",
            Department::ClientServices => "client_services",
            Department::Production => "production",
            Department::Sales => "sales",
            Department::Operations => "operations",
            Department::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl Department {
    /// Collapse departments without a dedicated agent onto the one that
    /// owns their work.
    pub fn collapse(self) -> Department {
        match self {
            Department::Sales => Department::Marketing,
            Department::Production | Department::Operations => Department::ClientServices,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Immutable result of classifying one inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub department: Department,
    pub priority: Priority,
    pub task_type: String,
    pub requires_human_approval: bool,
    pub complexity: Complexity,
    #[serde(default)]
    pub secondary_departments: Option<Vec<Department>>,
    pub summary: String,
}

impl Classification {
    /// Default applied when the model's reply cannot be decoded. Routes to
    /// a human instead of guessing a department.
    pub fn fallback(summary: impl Into<String>) -> Self {
        Self {
            department: Department::ClientServices,
            priority: Priority::Medium,
            task_type: "unclassified".to_string(),
            requires_human_approval: true,
            complexity: Complexity::Moderate,
            secondary_departments: None,
            summary: summary.into(),
        }
    }
}

/// Classification plus whether the fallback was applied.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub classification: Classification,
    pub fallback_applied: bool,
}

/// An event as received from the webhook ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event: String,
    pub collection: String,
    pub key: String,
    #[serde(default)]
    pub payload: Value,
}

const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You are a task classifier for a business operations platform. Given an \
inbound event, decide which department should handle it. Respond with a \
single JSON object and nothing else:
{
  \"department\": \"finance|marketing|client_services|production|sales|operations|unknown\",
  \"priority\": \"critical|high|medium|low\",
  \"task_type\": \"<short label>\",
  \"requires_human_approval\": true|false,
  \"complexity\": \"simple|moderate|complex\",
  \"secondary_departments\": [\"...\"] or null,
  \"summary\": \"<one sentence>\"
}";

/// Classifies inbound events with one tool-free LLM call.
pub struct TaskClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl TaskClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify an event. Transport failures propagate; an undecodable
    /// reply yields the fallback classification, flagged as such.
    pub async fn classify(
        &self,
        event: &InboundEvent,
    ) -> Result<ClassificationOutcome, ClassifyError> {
        let prompt = format!(
            "Classify this event.\n\nEvent: {}\nCollection: {}\nRecord: {}\nPayload: {}",
            event.event,
            event.collection,
            event.key,
            serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string()),
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])
        .with_temperature(0.0);

        let response = self.llm.complete(request).await?;

        match decode_classification(&response.content) {
            Ok(classification) => Ok(ClassificationOutcome {
                classification,
                fallback_applied: false,
            }),
            Err(err) => {
                tracing::warn!(
                    collection = %event.collection,
                    key = %event.key,
                    "Classification reply undecodable, applying fallback: {err}"
                );
                Ok(ClassificationOutcome {
                    classification: Classification::fallback(format!(
                        "Unclassified {} event on {}",
                        event.event, event.collection
                    )),
                    fallback_applied: true,
                })
            }
        }
    }
}

/// Decode a classification from a model reply that may wrap the JSON in
/// prose or a fenced code block.
pub fn decode_classification(raw: &str) -> Result<Classification, ClassifyError> {
    let json = extract_first_json_object(raw).ok_or_else(|| ClassifyError::Parse {
        reason: "no JSON object found in reply".to_string(),
        raw: raw.to_string(),
    })?;

    serde_json::from_str(json).map_err(|e| ClassifyError::Parse {
        reason: e.to_string(),
        raw: raw.to_string(),
    })
}

/// Find the first balanced `{ ... }` span, ignoring braces inside string
/// literals.
fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "department": "finance",
        "priority": "high",
        "task_type": "invoice_review",
        "requires_human_approval": false,
        "complexity": "simple",
        "secondary_departments": null,
        "summary": "Review a new invoice"
    }"#;

    #[test]
    fn test_decodes_bare_json() {
        let c = decode_classification(VALID).unwrap();
        assert_eq!(c.department, Department::Finance);
        assert_eq!(c.priority, Priority::High);
        assert!(!c.requires_human_approval);
    }

    #[test]
    fn test_decodes_json_wrapped_in_prose_and_fences() {
        let wrapped = format!("Here is my analysis:\n```json\n{VALID}\n```\nDone.");
        let c = decode_classification(&wrapped).unwrap();
        assert_eq!(c.department, Department::Finance);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_extraction() {
        let tricky = r#"{"department": "marketing", "priority": "low",
            "task_type": "copy {draft}", "requires_human_approval": false,
            "complexity": "simple", "secondary_departments": null,
            "summary": "Text with } brace \" and { more"}"#;
        let c = decode_classification(tricky).unwrap();
        assert_eq!(c.department, Department::Marketing);
        assert_eq!(c.task_type, "copy {draft}");
    }

    #[test]
    fn test_missing_field_is_a_parse_error() {
        let incomplete = r#"{"department": "finance"}"#;
        let err = decode_classification(incomplete).unwrap_err();
        assert!(matches!(err, ClassifyError::Parse { .. }));
    }

    #[test]
    fn test_no_json_at_all() {
        let err = decode_classification("I cannot classify this.").unwrap_err();
        assert!(matches!(err, ClassifyError::Parse { .. }));
    }

    #[test]
    fn test_department_collapse() {
        assert_eq!(Department::Sales.collapse(), Department::Marketing);
        assert_eq!(Department::Production.collapse(), Department::ClientServices);
        assert_eq!(Department::Operations.collapse(), Department::ClientServices);
        assert_eq!(Department::Finance.collapse(), Department::Finance);
    }
}
