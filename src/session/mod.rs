//! Session-scoped access control.

mod access;
mod registry;

pub use access::{AccessDecision, AccessValidator, DATA_TOOL_PREFIX};
pub use registry::{Session, SessionInfo, SessionRegistry, SessionSummary};
