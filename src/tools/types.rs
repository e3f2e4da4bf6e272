//! Tool types for InboxPilot
//!
//! Defines the `Tool` trait every triage tool implements, the per-session
//! [`ToolContext`] handed to handlers, and the invocation/result pair that
//! flows between the model and the registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::email::InboundEmail;

use super::ledger::SessionLedger;

/// Side-effect class of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Pure classification of the inbound email.
    Classification,
    /// Read-only external lookup.
    Research,
    /// Notifies an external channel; idempotent per email.
    Notification,
    /// Delivers mail. Not idempotent.
    Send,
    /// Saves a draft; repeat calls overwrite.
    Draft,
    /// Pure text generation.
    Generation,
}

impl ToolCategory {
    /// Terminal tools have outcomes that cannot be safely retried or
    /// assumed. A timeout on one ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolCategory::Send)
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classification => write!(f, "classification"),
            Self::Research => write!(f, "research"),
            Self::Notification => write!(f, "notification"),
            Self::Send => write!(f, "send"),
            Self::Draft => write!(f, "draft"),
            Self::Generation => write!(f, "generation"),
        }
    }
}

/// Why a tool invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolFailureKind {
    UnknownTool,
    InvalidToolArguments,
    LookupTimeout,
    LookupUnavailable,
    Timeout,
    /// A send for this email is recorded as in progress with unknown outcome.
    SendInDoubt,
    ExecutionFailed,
}

impl std::fmt::Display for ToolFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownTool => "UnknownTool",
            Self::InvalidToolArguments => "InvalidToolArguments",
            Self::LookupTimeout => "LookupTimeout",
            Self::LookupUnavailable => "LookupUnavailable",
            Self::Timeout => "Timeout",
            Self::SendInDoubt => "SendInDoubt",
            Self::ExecutionFailed => "ExecutionFailed",
        };
        write!(f, "{}", s)
    }
}

/// Failure descriptor fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolFailureKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: ToolFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ToolFailureKind::InvalidToolArguments, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolFailureKind::ExecutionFailed, message)
    }
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A model's request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call identifier assigned by the model
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of executing a [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success(Value),
    Failure(ToolFailure),
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            ToolResult::Failure(f) => Some(f),
            ToolResult::Success(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResult::Success(v) => Some(v),
            ToolResult::Failure(_) => None,
        }
    }

    /// JSON rendering stored as the `tool_result` turn content.
    pub fn render(&self) -> String {
        let value = match self {
            ToolResult::Success(payload) => json!({ "ok": true, "result": payload }),
            ToolResult::Failure(failure) => json!({
                "ok": false,
                "error": { "kind": failure.kind, "message": failure.message }
            }),
        };
        value.to_string()
    }
}

impl From<std::result::Result<Value, ToolFailure>> for ToolResult {
    fn from(result: std::result::Result<Value, ToolFailure>) -> Self {
        match result {
            Ok(v) => ToolResult::Success(v),
            Err(f) => ToolResult::Failure(f),
        }
    }
}

/// Trait that all tools must implement.
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use inboxpilot::tools::{Tool, ToolCategory, ToolContext, ToolFailure};
///
/// struct WordCount;
///
/// #[async_trait]
/// impl Tool for WordCount {
///     fn name(&self) -> &str { "WordCount" }
///     fn description(&self) -> &str { "Count words in the inbound email" }
///     fn parameters(&self) -> Value { json!({"type": "object", "properties": {}}) }
///     fn category(&self) -> ToolCategory { ToolCategory::Classification }
///     async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
///         Ok(json!({ "words": ctx.email.body.split_whitespace().count() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to select this tool. Unique within a registry.
    fn name(&self) -> &str;

    /// Tells the model when and why to use the tool.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments. Arguments are validated against it
    /// before `execute` is called.
    fn parameters(&self) -> Value;

    fn category(&self) -> ToolCategory;

    /// Per-call timeout. `None` uses the session default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the tool. Expected failures are returned as [`ToolFailure`] data.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> std::result::Result<Value, ToolFailure>;
}

/// Per-session context bound into every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The email this session is triaging
    pub email: Arc<InboundEmail>,
    /// Side-effect records for this session
    pub ledger: Arc<SessionLedger>,
}

impl ToolContext {
    pub fn new(email: Arc<InboundEmail>) -> Self {
        Self {
            email,
            ledger: Arc::new(SessionLedger::new()),
        }
    }

    pub fn email_id(&self) -> &str {
        &self.email.id
    }
}

/// Fetch a required, non-blank string argument.
pub fn required_str<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, ToolFailure> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolFailure::invalid_arguments(format!("Missing '{}' parameter", key)))
}

/// Fetch an optional, non-blank string argument.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_send_is_terminal() {
        assert!(ToolCategory::Send.is_terminal());
        assert!(!ToolCategory::Draft.is_terminal());
        assert!(!ToolCategory::Research.is_terminal());
    }

    #[test]
    fn test_render_success() {
        let result = ToolResult::Success(json!({"label": "spam"}));
        let rendered: Value = serde_json::from_str(&result.render()).unwrap();
        assert_eq!(rendered["ok"], true);
        assert_eq!(rendered["result"]["label"], "spam");
    }

    #[test]
    fn test_render_failure() {
        let result = ToolResult::Failure(ToolFailure::new(
            ToolFailureKind::LookupTimeout,
            "search took too long",
        ));
        let rendered: Value = serde_json::from_str(&result.render()).unwrap();
        assert_eq!(rendered["ok"], false);
        assert_eq!(rendered["error"]["kind"], "LookupTimeout");
        assert_eq!(rendered["error"]["message"], "search took too long");
    }

    #[test]
    fn test_required_str() {
        let args = json!({"reason": "  urgent  ", "blank": " "});
        assert_eq!(required_str(&args, "reason").unwrap(), "urgent");
        let err = required_str(&args, "blank").unwrap_err();
        assert_eq!(err.kind, ToolFailureKind::InvalidToolArguments);
        assert!(required_str(&args, "missing").is_err());
        assert!(optional_str(&args, "blank").is_none());
    }

    #[test]
    fn test_failure_display() {
        let failure = ToolFailure::new(ToolFailureKind::UnknownTool, "SendSMS");
        assert_eq!(failure.to_string(), "UnknownTool: SendSMS");
    }
}
