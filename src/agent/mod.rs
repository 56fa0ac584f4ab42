//! Department agents and the machinery that feeds them.
//!
//! The flow is: inbound event -> (optional) classification -> descriptor
//! lookup -> session-scoped conversation drive. Each concrete agent is a
//! stateless descriptor; all per-task state lives in `TaskContext` and the
//! session registry.

mod classifier;
mod client_services;
mod descriptor;
mod driver;
mod email;
mod finance;
mod marketing;
mod prompts;
mod router;

pub use classifier::{
    Classification, ClassificationOutcome, Complexity, Department, InboundEvent, Priority,
    TaskClassifier, decode_classification,
};
pub use client_services::ClientServicesAgent;
pub use descriptor::{
    DepartmentAgent, TaskContext, draft_action, handle_store_tool, is_draft,
    store_tool_definitions,
};
pub use driver::{ConversationDriver, DriveOutcome};
pub use email::EmailAgent;
pub use finance::FinanceAgent;
pub use marketing::MarketingAgent;
pub use prompts::{PromptCache, substitute_variables};
pub use router::{DispatchReport, Dispatcher, agent_type_for_collection};
