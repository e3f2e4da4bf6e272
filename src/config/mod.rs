//! Configuration management for InboxPilot
//!
//! Configuration is loaded from `~/.inboxpilot/config.json` (or an explicit
//! path) with environment variable overrides applied on top.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::{PilotError, Result};

impl Config {
    /// Returns the InboxPilot configuration directory path (~/.inboxpilot)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".inboxpilot")
    }

    /// Returns the path to the config file (~/.inboxpilot/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                PilotError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `INBOXPILOT_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric values are ignored and the configured value kept.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Agent defaults
        if let Some(val) = lookup("INBOXPILOT_MODEL") {
            self.agents.defaults.model = val;
        }
        if let Some(v) = lookup("INBOXPILOT_MAX_TOOL_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.agents.defaults.max_tool_iterations = v;
        }
        if let Some(v) = lookup("INBOXPILOT_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.agents.defaults.temperature = v;
        }
        if let Some(val) = lookup("INBOXPILOT_SYSTEM_PROMPT") {
            self.agents.defaults.system_prompt = Some(val);
        }

        // Memory
        if let Some(v) = lookup("INBOXPILOT_MEMORY_TOKEN_BUDGET").and_then(|v| v.parse().ok()) {
            self.memory.token_budget = v;
        }

        // Provider credentials. The bare OpenAI variable is honoured so an
        // existing `.env` keeps working.
        if let Some(val) =
            lookup("INBOXPILOT_OPENAI_API_KEY").or_else(|| lookup("OPENAI_API_KEY"))
        {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_key = Some(val);
        }
        if let Some(val) = lookup("INBOXPILOT_OPENAI_API_BASE") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_base = Some(val);
        }

        // Gateway
        if let Some(val) = lookup("INBOXPILOT_GATEWAY_HOST") {
            self.gateway.host = val;
        }
        if let Some(v) = lookup("INBOXPILOT_GATEWAY_PORT").and_then(|v| v.parse().ok()) {
            self.gateway.port = v;
        }

        // Notifications
        if let Some(val) = lookup("INBOXPILOT_NOTIFICATIONS_PROJECT") {
            self.notifications.project = val;
        }
        if let Some(val) = lookup("INBOXPILOT_NOTIFICATIONS_TOPIC") {
            self.notifications.new_mail_topic = val;
        }

        // Tools
        if let Some(val) = lookup("INBOXPILOT_BRAVE_API_KEY") {
            self.tools.research.brave_api_key = Some(val);
        }

        // Mailbox
        if let Some(val) = lookup("INBOXPILOT_MAILBOX_ADDRESS") {
            self.mailbox.address = val;
        }
        if let Some(val) = lookup("INBOXPILOT_DRAFTS_DIR") {
            self.mailbox.drafts_dir = Some(val);
        }

        // Logging
        if let Some(val) = lookup("INBOXPILOT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("INBOXPILOT_LOG_FORMAT") {
            match val.to_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "pretty" => self.logging.format = LogFormat::Pretty,
                "component" => self.logging.format = LogFormat::Component,
                _ => {}
            }
        }
    }

    /// The configured OpenAI API key, if any non-empty key is present.
    pub fn openai_api_key(&self) -> Option<&str> {
        self.providers
            .openai
            .as_ref()
            .and_then(|p| p.api_key.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// The configured OpenAI base URL override, if any.
    pub fn openai_api_base(&self) -> Option<&str> {
        self.providers
            .openai
            .as_ref()
            .and_then(|p| p.api_base.as_deref())
    }
}
