//! Agent module - Email triage sessions
//!
//! The agent is responsible for:
//!
//! - Framing an inbound email as the opening user turn
//! - Building the system prompt with persona and runtime context
//! - Asking the model client for one decision at a time
//! - Executing the chosen tool and feeding its result back
//! - Ending in `Done` with a final answer or `Failed` with a cause
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Gateway   │────>│ TriageAgent  │────>│ ModelClient │
//! │ (HTTP, bus) │     │              │     │  (OpenAI)   │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            │ one per email
//!                            ▼
//!                     ┌──────────────┐     ┌─────────────┐
//!                     │ AgentSession │────>│    Tools    │
//!                     │  + Memory    │     │  Registry   │
//!                     └──────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inboxpilot::agent::TriageAgent;
//! use inboxpilot::bus::NotificationBus;
//! use inboxpilot::config::Config;
//! use inboxpilot::email::InboundEmail;
//! use inboxpilot::mailbox::InMemoryMailbox;
//!
//! async fn triage_one() {
//!     let config = Config::load().unwrap();
//!     let agent = TriageAgent::from_config(
//!         &config,
//!         Arc::new(NotificationBus::new()),
//!         Arc::new(InMemoryMailbox::new()),
//!     )
//!     .unwrap();
//!
//!     let (_tx, cancel) = tokio::sync::watch::channel(false);
//!     let report = agent
//!         .triage(InboundEmail::from_text("Hi, I'd like info about your pricing"), cancel)
//!         .await;
//!     println!("{:?}", report.output);
//! }
//! ```

mod context;
mod r#loop;
pub mod model;
mod triage;

pub use context::{build_system_prompt, persona_prompt, RuntimeContext};
pub use model::{ModelClient, ModelDecision, ProviderModelClient};
pub use r#loop::{AgentSession, SessionReport, SessionSettings, SessionState, ToolCallRecord};
pub use triage::TriageAgent;
