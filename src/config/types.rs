//! Configuration type definitions for InboxPilot
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial (or absent) config file is always valid.

use serde::{Deserialize, Serialize};

/// Main configuration struct for InboxPilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (model, step ceiling, timeouts)
    pub agents: AgentConfig,
    /// Conversation memory configuration
    pub memory: MemoryConfig,
    /// LLM provider configuration
    pub providers: ProvidersConfig,
    /// Gateway server configuration
    pub gateway: GatewayConfig,
    /// Notification bus topics
    pub notifications: NotificationConfig,
    /// Tool backends configuration
    pub tools: ToolsConfig,
    /// Mailbox identity and delivery configuration
    pub mailbox: MailboxConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Default settings for every triage session
    pub defaults: AgentDefaults,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Model identifier passed to the provider
    pub model: String,
    /// Maximum tokens the model may generate per call
    pub max_tokens: u32,
    /// Sampling temperature (0.0 keeps triage decisions deterministic)
    pub temperature: f32,
    /// Step ceiling: maximum tool round-trips per session
    pub max_tool_iterations: u32,
    /// Per-call timeout for model inference, in seconds
    pub model_timeout_secs: u64,
    /// Default per-call timeout for tool handlers, in seconds
    pub tool_timeout_secs: u64,
    /// Attempts per model call before the session fails
    pub model_max_attempts: u32,
    /// Base backoff delay between model attempts, in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff cap between model attempts, in milliseconds
    pub retry_max_delay_ms: u64,
    /// Full system prompt override. When unset the persona prompt is used.
    pub system_prompt: Option<String>,
    /// Name of the person whose inbox is being handled
    pub assistant_name: String,
    /// Short description of that person, used in the persona prompt
    pub assistant_role: String,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            max_tool_iterations: 15,
            model_timeout_secs: 60,
            tool_timeout_secs: 30,
            model_max_attempts: 2,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 5_000,
            system_prompt: None,
            assistant_name: "Ale".to_string(),
            assistant_role: "an electrical engineer working for a power electronics company"
                .to_string(),
        }
    }
}

// ============================================================================
// Memory Configuration
// ============================================================================

/// Conversation memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Token budget B for summary + verbatim turns
    pub token_budget: usize,
    /// Consecutive summarization failures tolerated before the session fails
    pub summary_max_failures: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_budget: 1000,
            summary_max_failures: 2,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// LLM provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI (or OpenAI-compatible) endpoint
    pub openai: Option<ProviderConfig>,
}

/// Configuration for a single provider endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key for authentication
    pub api_key: Option<String>,
    /// Custom API base URL
    pub api_base: Option<String>,
}

// ============================================================================
// Gateway Configuration
// ============================================================================

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How long a processed email id is remembered for deduplication, in seconds
    pub dedup_ttl_secs: u64,
    /// Maximum number of remembered email ids
    pub dedup_max_entries: usize,
    /// Maximum accepted request body, in bytes
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            dedup_ttl_secs: 3600,
            dedup_max_entries: 10_000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

// ============================================================================
// Notification Configuration
// ============================================================================

/// Notification bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Project identifier prefixed to every topic name
    pub project: String,
    /// Topic carrying new-mail events
    pub new_mail_topic: String,
    /// Topic carrying escalation records
    pub escalation_topic: String,
    /// Per-topic buffer capacity
    pub buffer_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            project: "inboxpilot".to_string(),
            new_mail_topic: "new-mail".to_string(),
            escalation_topic: "escalations".to_string(),
            buffer_size: 100,
        }
    }
}

impl NotificationConfig {
    /// Fully qualified topic name: `<project>/<topic>`.
    pub fn qualified(&self, topic: &str) -> String {
        if self.project.is_empty() {
            topic.to_string()
        } else {
            format!("{}/{}", self.project, topic)
        }
    }
}

// ============================================================================
// Tools Configuration
// ============================================================================

/// Tool backends configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Prospect research backend
    pub research: ResearchConfig,
}

/// Prospect research configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Brave Search API key
    pub brave_api_key: Option<String>,
    /// Lookup timeout, in seconds
    pub timeout_secs: u64,
    /// Maximum search results folded into a profile
    pub max_results: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            brave_api_key: None,
            timeout_secs: 10,
            max_results: 5,
        }
    }
}

// ============================================================================
// Mailbox Configuration
// ============================================================================

/// Mailbox identity and delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Address replies are sent from
    pub address: String,
    /// Directory for persisted drafts. In-memory drafts when unset.
    pub drafts_dir: Option<String>,
    /// SMTP relay (used with the `smtp` feature)
    pub smtp: Option<SmtpConfig>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            address: "assistant@localhost".to_string(),
            drafts_dir: None,
            smtp: None,
        }
    }
}

/// SMTP relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    Pretty,
    /// Compact text with a `component` field per subsystem
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter level, overridden by `RUST_LOG`
    pub level: String,
    /// Optional log file (JSON format only)
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}
