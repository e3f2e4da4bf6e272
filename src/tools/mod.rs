//! Tools module - Triage tools the model can call
//!
//! - `Tool` trait: the interface every tool implements
//! - `ToolContext`: the email under triage plus the session's side-effect ledger
//! - `ToolRegistry`: validates arguments against each tool's schema and
//!   executes one invocation at a time
//!
//! # Triage tools
//!
//! | Tool                    | Category       | Side effect                  |
//! |-------------------------|----------------|------------------------------|
//! | `CategoriseEmail`       | classification | none                         |
//! | `ProspectResearch`      | research       | external lookup              |
//! | `Escalate`              | notification   | publishes on the bus, once   |
//! | `ReplyEmail`            | send           | sends mail, at most once     |
//! | `CreateEmailDraft`      | draft          | saves or overwrites a draft  |
//! | `GenerateEmailResponse` | generation     | none                         |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use inboxpilot::email::InboundEmail;
//! use inboxpilot::mailbox::InMemoryMailbox;
//! use inboxpilot::tools::{ToolContext, ToolInvocation, ToolRegistry};
//! use inboxpilot::tools::mailbox::CreateEmailDraftTool;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let mailbox = Arc::new(InMemoryMailbox::new());
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(Box::new(CreateEmailDraftTool::new(mailbox.clone(), "me@example.com")))
//!     .unwrap();
//!
//! let ctx = ToolContext::new(Arc::new(InboundEmail::new("a@b.co", "Hi", "Hello")));
//! let call = ToolInvocation::new("call_1", "CreateEmailDraft", json!({"body": "Thanks!"}));
//! let execution = registry.execute(&call, &ctx, Duration::from_secs(5)).await;
//! assert!(execution.result.is_success());
//! assert_eq!(mailbox.draft_count(), 1);
//! # });
//! ```

pub mod categorise;
pub mod escalate;
pub mod generate;
pub mod ledger;
pub mod mailbox;
mod registry;
pub mod research;
mod types;

use std::sync::Arc;
use std::time::Duration;

pub use categorise::CategoriseEmailTool;
pub use escalate::{EscalateTool, EscalationRecord};
pub use generate::GenerateEmailResponseTool;
pub use ledger::{SendGate, SessionLedger};
pub use mailbox::{CreateEmailDraftTool, ReplyEmailTool};
pub use registry::{ToolExecution, ToolRegistry};
pub use research::{BraveResearch, ProspectResearchTool, ResearchBackend};
pub use types::{
    optional_str, required_str, Tool, ToolCategory, ToolContext, ToolFailure, ToolFailureKind,
    ToolInvocation, ToolResult,
};

use crate::agent::ModelClient;
use crate::bus::NotificationBus;
use crate::config::Config;
use crate::error::Result;
use crate::mailbox::Mailbox;

/// Shared backends the triage tools are built from.
#[derive(Clone)]
pub struct ToolDeps {
    pub model: Arc<dyn ModelClient>,
    pub mailbox: Arc<dyn Mailbox>,
    pub bus: Arc<NotificationBus>,
    pub research: Arc<dyn ResearchBackend>,
}

impl ToolDeps {
    /// Deps using the Brave research backend from config.
    pub fn new(
        config: &Config,
        model: Arc<dyn ModelClient>,
        mailbox: Arc<dyn Mailbox>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            model,
            mailbox,
            bus,
            research: Arc::new(BraveResearch::from_config(&config.tools.research)),
        }
    }

    pub fn with_research(mut self, research: Arc<dyn ResearchBackend>) -> Self {
        self.research = research;
        self
    }
}

/// Register the six triage tools.
pub fn build_registry(config: &Config, deps: ToolDeps) -> Result<ToolRegistry> {
    let defaults = &config.agents.defaults;
    let from = config.mailbox.address.clone();
    let escalation_topic = config
        .notifications
        .qualified(&config.notifications.escalation_topic);

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CategoriseEmailTool::new(Arc::clone(&deps.model))))?;
    registry.register(Box::new(ProspectResearchTool::new(
        deps.research,
        Duration::from_secs(config.tools.research.timeout_secs),
    )))?;
    registry.register(Box::new(EscalateTool::new(deps.bus, escalation_topic)))?;
    registry.register(Box::new(ReplyEmailTool::new(Arc::clone(&deps.mailbox), from.clone())))?;
    registry.register(Box::new(CreateEmailDraftTool::new(deps.mailbox, from)))?;
    registry.register(Box::new(GenerateEmailResponseTool::new(
        deps.model,
        defaults.assistant_name.clone(),
    )))?;
    Ok(registry)
}
