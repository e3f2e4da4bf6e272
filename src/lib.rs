//! InboxPilot - Email triage agent
//!
//! Each inbound email gets one agent session that repeatedly asks a language
//! model which tool to run next (categorise, research, escalate, draft,
//! generate, reply) until the model gives a final answer. Conversation memory
//! is kept under a token budget by folding old turns into a rolling summary.

pub mod agent;
pub mod bus;
pub mod config;
pub mod email;
pub mod error;
pub mod gateway;
pub mod mailbox;
pub mod memory;
pub mod providers;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentSession, SessionReport, SessionState, TriageAgent};
pub use config::Config;
pub use email::InboundEmail;
pub use error::{PilotError, Result};
pub use memory::MemoryStore;
pub use tools::{Tool, ToolRegistry};
