//! warden: task classification and session-scoped access control for
//! autonomous agents working against a shared record store.
//!
//! Inbound events (webhook deliveries or manual triggers) become tasks.
//! Each task is classified to a department agent, runs inside a session
//! scoped to the record that triggered it, and every data-store tool call
//! the agent makes is validated against that scope before it executes.

pub mod agent;
pub mod audit;
pub mod availability;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;
pub mod store;

pub use agent::{Department, DispatchReport, Dispatcher, InboundEvent};
pub use config::Config;
pub use context::ServiceContext;
pub use session::{AccessDecision, AccessValidator, SessionRegistry, SessionSummary};
