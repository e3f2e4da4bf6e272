//! Conversation turns
//!
//! A [`ConversationTurn`] is immutable once built: fields are private and only
//! readable through accessors, so a turn held by the memory store never
//! changes after `append`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    ToolResult,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
            TurnRole::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// Reference to the tool call a turn requests or answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRef {
    /// Call identifier, shared by the request turn and its result turn
    pub id: String,
    /// Tool name as requested by the model
    pub name: String,
    /// Arguments as requested by the model
    pub arguments: Value,
}

/// One exchange unit in a session's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: TurnRole,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call: Option<ToolCallRef>,
}

impl ConversationTurn {
    /// A user turn (the inbound email framing).
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            tool_call: None,
        }
    }

    /// A plain assistant turn with no tool call.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_call: None,
        }
    }

    /// An assistant turn requesting a tool.
    pub fn tool_request(content: impl Into<String>, call: ToolCallRef) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_call: Some(call),
        }
    }

    /// The result of executing `call`, rendered as `content`.
    pub fn tool_result(call: ToolCallRef, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::ToolResult,
            content: content.into(),
            tool_call: Some(call),
        }
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_call(&self) -> Option<&ToolCallRef> {
        self.tool_call.as_ref()
    }

    /// Plain-text rendering used when folding turns into a summary.
    pub fn transcript_line(&self) -> String {
        match (&self.role, &self.tool_call) {
            (TurnRole::Assistant, Some(call)) => {
                let mut line = format!("assistant -> {}({})", call.name, call.arguments);
                if !self.content.is_empty() {
                    line = format!("assistant: {}\n{}", self.content, line);
                }
                line
            }
            (TurnRole::ToolResult, Some(call)) => {
                format!("tool_result[{}]: {}", call.name, self.content)
            }
            (role, _) => format!("{}: {}", role, self.content),
        }
    }
}
