//! Record store access.

mod client;

pub use client::RecordStoreClient;

/// Collection holding per-agent prompt overrides.
pub const PROMPTS_COLLECTION: &str = "service_prompts";
/// Collection holding agent activity and violation records.
pub const LOGS_COLLECTION: &str = "agent_logs";
/// Collection holding drafted workflows awaiting human approval.
pub const WORKFLOWS_COLLECTION: &str = "service_workflows";
/// Collection holding persisted agent enable/disable flags.
pub const SETTINGS_COLLECTION: &str = "agent_settings";
/// Collection holding human approval prompts.
pub const APPROVALS_COLLECTION: &str = "human_prompts";
