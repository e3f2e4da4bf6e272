//! Gateway module - HTTP front end for triage sessions
//!
//! Accepts emails over HTTP, deduplicates them by email id, and either runs
//! a session inline (`POST /`) or queues it on the notification bus for the
//! background [`TriageWorker`] (`POST /notifications`). [`EscalationLog`]
//! consumes the escalation topic.

pub mod escalations;
pub mod idempotency;
pub mod server;
pub mod worker;

pub use escalations::EscalationLog;
pub use idempotency::{Claim, IdempotencyStore};
pub use server::{router, serve, CachedResponse, EmailPayload, GatewayState};
pub use worker::{results_topic, TriageWorker};
