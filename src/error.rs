//! Error types for InboxPilot
//!
//! Three layers of failure show up in a triage session:
//!
//! - [`PilotError`]: infrastructure errors (config, I/O, HTTP, bus) returned
//!   through the crate-wide [`Result`].
//! - [`ModelError`]: what the model client surfaces to the agent loop.
//! - [`SessionFailure`]: the terminal cause recorded when a session ends `FAILED`.
//!
//! Tool-local failures are not errors at this level; they are data
//! (`tools::ToolFailure`) fed back to the model.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Lets the model client decide between retrying and failing fast without
/// string matching on error messages.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// 401: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit or quota exceeded
    RateLimit(String),
    /// 402: Payment required or billing issue
    Billing(String),
    /// 500/502/503/504: Server-side errors
    ServerError(String),
    /// 400: Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404: Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Provider is overloaded: retry with backoff
    Overloaded(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for PilotError {
    fn from(err: ProviderError) -> Self {
        PilotError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for InboxPilot operations.
#[derive(Error, Debug)]
pub enum PilotError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors (transport failures, unparseable bodies)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification for retry decisions.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool construction or wiring errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool registration or lookup errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Memory store errors
    #[error("Memory error: {0}")]
    Memory(String),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(String),

    /// Mailbox provider errors (send or draft failures)
    #[error("Mailbox error: {0}")]
    Mailbox(String),

    /// Notification bus errors
    #[error("Bus error: {0}")]
    Bus(String),

    /// Notification bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for InboxPilot operations.
pub type Result<T> = std::result::Result<T, PilotError>;

// ============================================================================
// Registry Errors
// ============================================================================

/// Failures raised by the tool registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    /// No tool with this name is registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The tool's parameter schema is not valid JSON Schema.
    #[error("invalid schema for tool {tool}: {message}")]
    InvalidSchema { tool: String, message: String },
}

// ============================================================================
// Model Client Errors
// ============================================================================

/// Failures surfaced by a model client.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// Network, rate-limit or server failure. `retryable` is false for
    /// failures that cannot succeed on a second attempt (bad credentials,
    /// billing, malformed request).
    #[error("model unavailable: {message}")]
    Unavailable { message: String, retryable: bool },

    /// The model replied, but not with a usable answer or tool call.
    #[error("model returned a malformed response: {0}")]
    MalformedResponse(String),

    /// The call ran past its deadline, in milliseconds.
    #[error("model call timed out after {0}ms")]
    Timeout(u64),
}

impl ModelError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        ModelError::Unavailable {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the agent loop should spend another attempt on this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Unavailable { retryable, .. } => *retryable,
            ModelError::MalformedResponse(_) | ModelError::Timeout(_) => true,
        }
    }
}

impl From<PilotError> for ModelError {
    fn from(err: PilotError) -> Self {
        match err {
            PilotError::ProviderTyped(pe) => ModelError::Unavailable {
                retryable: pe.is_retryable(),
                message: pe.to_string(),
            },
            PilotError::Json(e) => ModelError::MalformedResponse(e.to_string()),
            other => ModelError::unavailable(other.to_string()),
        }
    }
}

// ============================================================================
// Session Failures
// ============================================================================

/// Terminal cause of a `FAILED` session.
///
/// The `Display` text is what the request handler reports as `detail`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("model unavailable after {attempts} attempt(s): {message}")]
    ModelUnavailable { attempts: u32, message: String },

    #[error("step ceiling of {ceiling} tool round-trips exceeded without a final answer")]
    StepCeilingExceeded { ceiling: u32 },

    #[error("memory summarization failed {failures} consecutive time(s): {message}")]
    SummarizationExhausted { failures: u32, message: String },

    #[error("memory over budget: {message}")]
    MemoryOverBudget { message: String },

    #[error("tool '{tool}' timed out after {timeout_ms}ms and its outcome is unknown")]
    TerminalToolTimeout { tool: String, timeout_ms: u64 },

    #[error("session cancelled")]
    Cancelled,
}
