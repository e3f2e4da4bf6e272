//! Session module - conversation units and the provider message format
//!
//! A triage session records its conversation as [`ConversationTurn`]s. Turns are
//! rendered into provider-facing [`Message`]s only when a model call is made.
//!
//! ```
//! use inboxpilot::session::{ConversationTurn, TurnRole};
//!
//! let turn = ConversationTurn::user("New email received:\nHi, I'd like info about your pricing");
//! assert_eq!(turn.role(), TurnRole::User);
//! assert!(turn.tool_call().is_none());
//! ```

pub mod turn;
pub mod types;

pub use turn::{ConversationTurn, ToolCallRef, TurnRole};
pub use types::{Message, Role, ToolCall};
