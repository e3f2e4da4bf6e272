//! Long-lived triage service: shared tools and model, one session per email.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::NotificationBus;
use crate::config::{AgentDefaults, Config};
use crate::email::InboundEmail;
use crate::error::Result;
use crate::mailbox::Mailbox;
use crate::tools::{build_registry, ToolDeps, ToolRegistry};

use super::context::{build_system_prompt, RuntimeContext};
use super::model::{ModelClient, ProviderModelClient};
use super::r#loop::{AgentSession, SessionReport, SessionSettings};

/// Builds and runs a fresh [`AgentSession`] for every inbound email.
///
/// Sessions share the tool registry and model client but nothing else: each
/// gets its own memory and side-effect ledger.
pub struct TriageAgent {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    settings: SessionSettings,
    defaults: AgentDefaults,
}

impl TriageAgent {
    pub fn new(registry: Arc<ToolRegistry>, model: Arc<dyn ModelClient>, config: &Config) -> Self {
        Self {
            registry,
            model,
            settings: SessionSettings::from(config),
            defaults: config.agents.defaults.clone(),
        }
    }

    /// Wire the OpenAI model client and the six triage tools from config.
    pub fn from_config(
        config: &Config,
        bus: Arc<NotificationBus>,
        mailbox: Arc<dyn Mailbox>,
    ) -> Result<Self> {
        let model: Arc<dyn ModelClient> = Arc::new(ProviderModelClient::from_config(config)?);
        let deps = ToolDeps::new(config, Arc::clone(&model), mailbox, bus);
        let registry = Arc::new(build_registry(config, deps)?);
        Ok(Self::new(registry, model, config))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// A new session for `email`, with the runtime context rendered into
    /// its system prompt.
    pub fn session(&self, email: InboundEmail) -> AgentSession {
        let runtime = RuntimeContext::new()
            .with_email_id(&email.id)
            .with_sender(email.sender.clone())
            .with_tools(self.registry.names().into_iter().map(String::from).collect())
            .with_current_time();
        let system_prompt = build_system_prompt(&self.defaults, &runtime);
        AgentSession::new(
            email,
            Arc::clone(&self.registry),
            Arc::clone(&self.model),
            self.settings.clone(),
            system_prompt,
        )
    }

    /// Triage one email to a final report.
    pub async fn triage(&self, email: InboundEmail, cancel: watch::Receiver<bool>) -> SessionReport {
        self.session(email).run_until_cancelled(cancel).await
    }
}
