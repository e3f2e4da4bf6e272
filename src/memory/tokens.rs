//! Token estimation
//!
//! Approximation used for the memory budget: one token per four characters,
//! rounded up, plus a fixed per-turn overhead for role and framing markers.
//! Exact tokenizer counts are not needed; the estimate only has to be
//! monotonic and stable so the budget check is reproducible.

use crate::session::ConversationTurn;

/// Characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Tokens charged per turn (and for a non-empty summary) for role markers.
pub const TURN_OVERHEAD_TOKENS: usize = 4;

/// Estimated tokens for raw text.
pub fn estimate_text(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated tokens for one turn, including any attached tool call.
pub fn estimate_turn(turn: &ConversationTurn) -> usize {
    let call_tokens = turn.tool_call().map_or(0, |call| {
        estimate_text(&call.name) + estimate_text(&call.arguments.to_string())
    });
    TURN_OVERHEAD_TOKENS + estimate_text(turn.content()) + call_tokens
}

/// Estimated tokens for the running summary. An empty summary is free.
pub fn estimate_summary(summary: &str) -> usize {
    if summary.is_empty() {
        0
    } else {
        TURN_OVERHEAD_TOKENS + estimate_text(summary)
    }
}

/// Estimated tokens for a sequence of turns.
pub fn estimate_turns(turns: &[ConversationTurn]) -> usize {
    turns.iter().map(estimate_turn).sum()
}
