//! Conversation memory with a rolling summary.
//!
//! A [`MemoryStore`] keeps recent turns verbatim plus one running summary of
//! everything evicted before them. The estimated cost of summary + verbatim
//! turns is held under a token budget `B`:
//!
//! - `append` pushes the turn; if the total now exceeds `B`, the oldest turns
//!   are folded into the summary through a [`Summarizer`] and removed.
//! - The eviction set is grown one turn at a time until the regenerated
//!   summary and the remaining turns fit.
//! - A summarizer failure is not fatal: the old summary and all turns are
//!   kept, a warning is logged and the outcome reports the failure streak.
//! - A summary that still exceeds `B` after folding every turn is an error.

pub mod tokens;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ModelError;
use crate::session::ConversationTurn;

use tokens::{estimate_summary, estimate_turn, estimate_turns};

/// Smallest budget that can hold a framed email plus a summary.
pub const MIN_TOKEN_BUDGET: usize = 64;

/// Text summarization capability used to fold evicted turns.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Return a replacement summary for `text`.
    async fn summarize(&self, text: &str) -> std::result::Result<String, ModelError>;
}

/// Unrecoverable memory states.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("summary needs {summary_tokens} tokens after folding every turn, budget is {budget}")]
    OverBudget { summary_tokens: usize, budget: usize },
}

/// What an `append` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The turn fit without summarization.
    Appended,
    /// `evicted` oldest turns were folded into a new summary.
    Summarized { evicted: usize },
    /// Summarization failed; nothing was evicted. `failures` counts the
    /// current streak of failed attempts.
    SummaryDeferred { failures: u32, message: String },
}

/// Read-only view of memory handed to the model on every call.
#[derive(Debug, Clone, Copy)]
pub struct MemorySnapshot<'a> {
    pub summary: &'a str,
    pub turns: &'a [ConversationTurn],
}

/// Per-session conversation memory.
#[derive(Debug)]
pub struct MemoryStore {
    budget: usize,
    summary: String,
    turns: Vec<ConversationTurn>,
    consecutive_failures: u32,
}

impl MemoryStore {
    /// Create an empty store with token budget `budget`.
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            summary: String::new(),
            turns: Vec::new(),
            consecutive_failures: 0,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Current run of failed summarization attempts.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Estimated tokens of summary + verbatim turns.
    pub fn total_tokens(&self) -> usize {
        estimate_summary(&self.summary) + estimate_turns(&self.turns)
    }

    pub fn is_within_budget(&self) -> bool {
        self.total_tokens() <= self.budget
    }

    pub fn snapshot(&self) -> MemorySnapshot<'_> {
        MemorySnapshot {
            summary: &self.summary,
            turns: &self.turns,
        }
    }

    /// Tokens kept free for the summary when choosing how many turns to evict.
    fn summary_reserve(&self) -> usize {
        self.budget / 4
    }

    /// Append a turn, summarizing the oldest turns when the budget is exceeded.
    pub async fn append<S>(
        &mut self,
        turn: ConversationTurn,
        summarizer: &S,
    ) -> std::result::Result<AppendOutcome, MemoryError>
    where
        S: Summarizer + ?Sized,
    {
        self.turns.push(turn);

        if self.is_within_budget() {
            self.consecutive_failures = 0;
            return Ok(AppendOutcome::Appended);
        }

        match self.fold_oldest(summarizer).await {
            Ok((summary, evicted)) => {
                self.summary = summary;
                self.turns.drain(..evicted);
                self.consecutive_failures = 0;
                debug!(
                    evicted,
                    total_tokens = self.total_tokens(),
                    budget = self.budget,
                    "Folded turns into summary"
                );
                Ok(AppendOutcome::Summarized { evicted })
            }
            Err(FoldError::Summarizer(e)) => {
                self.consecutive_failures += 1;
                warn!(
                    failures = self.consecutive_failures,
                    error = %e,
                    total_tokens = self.total_tokens(),
                    budget = self.budget,
                    "Summarization failed, keeping previous summary"
                );
                Ok(AppendOutcome::SummaryDeferred {
                    failures: self.consecutive_failures,
                    message: e.to_string(),
                })
            }
            Err(FoldError::Memory(e)) => Err(e),
        }
    }

    /// Smallest number of oldest turns whose removal leaves the rest within
    /// `budget - reserve`. Always at least one.
    fn initial_eviction_count(&self) -> usize {
        let target = self.budget.saturating_sub(self.summary_reserve());
        let mut remaining = estimate_turns(&self.turns);
        let mut count = 0;
        while count < self.turns.len() && remaining > target {
            remaining -= estimate_turn(&self.turns[count]);
            count += 1;
        }
        count.max(1)
    }

    /// Compute a new summary and eviction count without touching state.
    async fn fold_oldest<S>(&self, summarizer: &S) -> std::result::Result<(String, usize), FoldError>
    where
        S: Summarizer + ?Sized,
    {
        let mut evict = self.initial_eviction_count();
        let mut folded = 0;
        let mut summary = self.summary.clone();

        loop {
            let prompt = build_summary_prompt(&summary, &self.turns[folded..evict]);
            summary = summarizer
                .summarize(&prompt)
                .await
                .map_err(FoldError::Summarizer)?
                .trim()
                .to_string();
            folded = evict;

            let summary_tokens = estimate_summary(&summary);
            if summary_tokens + estimate_turns(&self.turns[evict..]) <= self.budget {
                return Ok((summary, evict));
            }
            if evict == self.turns.len() {
                return Err(FoldError::Memory(MemoryError::OverBudget {
                    summary_tokens,
                    budget: self.budget,
                }));
            }
            evict += 1;
        }
    }
}

enum FoldError {
    Summarizer(ModelError),
    Memory(MemoryError),
}

/// Prompt asking the model to extend `summary` with `turns`.
pub fn build_summary_prompt(summary: &str, turns: &[ConversationTurn]) -> String {
    let current = if summary.is_empty() { "(none)" } else { summary };
    let lines = turns
        .iter()
        .map(ConversationTurn::transcript_line)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Progressively summarize the conversation of an email assistant, extending the \
         current summary with the new lines. Keep what later steps need: sender, \
         category, urgency, and actions already taken (escalations, drafts, sent \
         replies). Be concise and reply with the new summary only.\n\n\
         Current summary:\n{}\n\nNew lines of conversation:\n{}\n\nNew summary:",
        current, lines
    )
}
