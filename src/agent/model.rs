//! Model client: the decision-making layer between memory and a provider.
//!
//! [`ModelClient::infer`] turns the current memory into one decision, either
//! a final answer or a single tool invocation. [`ModelClient::complete`] is
//! plain text completion used by tools and by memory summarization.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Config;
use crate::error::{ModelError, PilotError, Result};
use crate::memory::{MemorySnapshot, Summarizer};
use crate::providers::{ChatOptions, LLMProvider, LLMToolCall, OpenAIProvider, ToolDefinition};
use crate::session::{ConversationTurn, Message, ToolCall, TurnRole};
use crate::tools::ToolInvocation;

/// System prompt for memory summarization calls.
pub const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You maintain a running summary of an email assistant's work. Reply with the summary text only.";

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    FinalAnswer(String),
    Invoke {
        /// Text the model produced alongside the call, often empty
        thought: String,
        invocation: ToolInvocation,
    },
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Decide the next step given the system prompt, memory and the tools
    /// available this step.
    async fn infer(
        &self,
        system: &str,
        memory: MemorySnapshot<'_>,
        tools: &[ToolDefinition],
    ) -> std::result::Result<ModelDecision, ModelError>;

    /// Single-shot text completion with no tools.
    async fn complete(&self, system: &str, prompt: &str) -> std::result::Result<String, ModelError>;
}

#[async_trait]
impl Summarizer for dyn ModelClient {
    async fn summarize(&self, text: &str) -> std::result::Result<String, ModelError> {
        self.complete(SUMMARIZER_SYSTEM_PROMPT, text).await
    }
}

/// [`ModelClient`] backed by a chat-completion provider.
pub struct ProviderModelClient {
    provider: Arc<dyn LLMProvider>,
    model: String,
    options: ChatOptions,
}

impl ProviderModelClient {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>, options: ChatOptions) -> Self {
        Self {
            provider,
            model: model.into(),
            options,
        }
    }

    /// Build an OpenAI-backed client from config. Fails without an API key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.openai_api_key().ok_or_else(|| {
            PilotError::Config(
                "No OpenAI API key configured (providers.openai.api_key or OPENAI_API_KEY)".into(),
            )
        })?;
        let provider = match config.openai_api_base() {
            Some(base) => OpenAIProvider::with_base_url(api_key, base),
            None => OpenAIProvider::new(api_key),
        };
        let defaults = &config.agents.defaults;
        let options = ChatOptions::new()
            .with_max_tokens(defaults.max_tokens)
            .with_temperature(defaults.temperature);
        Ok(Self::new(Arc::new(provider), defaults.model.clone(), options))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelClient for ProviderModelClient {
    async fn infer(
        &self,
        system: &str,
        memory: MemorySnapshot<'_>,
        tools: &[ToolDefinition],
    ) -> std::result::Result<ModelDecision, ModelError> {
        let messages = build_messages(system, memory);
        let response = self
            .provider
            .chat(messages, tools.to_vec(), Some(&self.model), self.options.clone())
            .await?;

        let mut calls = response.tool_calls.into_iter();
        if let Some(first) = calls.next() {
            let dropped = calls.count();
            if dropped > 0 {
                warn!(tool = %first.name, dropped, "Model returned several tool calls, using the first");
            }
            return Ok(ModelDecision::Invoke {
                thought: response.content.trim().to_string(),
                invocation: to_invocation(first),
            });
        }

        let answer = response.content.trim();
        if answer.is_empty() {
            return Err(ModelError::MalformedResponse(
                "reply had neither content nor a tool call".into(),
            ));
        }
        Ok(ModelDecision::FinalAnswer(answer.to_string()))
    }

    async fn complete(&self, system: &str, prompt: &str) -> std::result::Result<String, ModelError> {
        let messages = vec![Message::system(system), Message::user(prompt)];
        let response = self
            .provider
            .chat(messages, Vec::new(), Some(&self.model), self.options.clone())
            .await?;
        let text = response.content.trim();
        if text.is_empty() {
            return Err(ModelError::MalformedResponse("empty completion".into()));
        }
        Ok(text.to_string())
    }
}

/// Arguments that are not valid JSON are kept as a string so schema
/// validation rejects them.
fn to_invocation(call: LLMToolCall) -> ToolInvocation {
    let raw = call.arguments.trim();
    let arguments = if raw.is_empty() {
        json!({})
    } else {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };
    let id = if call.id.is_empty() {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    } else {
        call.id
    };
    ToolInvocation::new(id, call.name, arguments)
}

/// Render memory as provider messages.
///
/// A tool result whose request turn was folded into the summary is sent as a
/// user message, since providers reject tool messages without a preceding call.
pub fn build_messages(system: &str, memory: MemorySnapshot<'_>) -> Vec<Message> {
    let mut messages = vec![Message::system(system)];
    if !memory.summary.is_empty() {
        messages.push(Message::system(&format!(
            "Summary of earlier conversation:\n{}",
            memory.summary
        )));
    }

    let turns = memory.turns;
    for (i, turn) in turns.iter().enumerate() {
        match (turn.role(), turn.tool_call()) {
            (TurnRole::User, _) => messages.push(Message::user(turn.content())),
            (TurnRole::Assistant, Some(call)) => {
                if answered_next(turns, i) {
                    let wire = ToolCall::new(&call.id, &call.name, &call.arguments.to_string());
                    messages.push(Message::assistant_with_tools(turn.content(), vec![wire]));
                } else {
                    messages.push(Message::assistant(&turn.transcript_line()));
                }
            }
            (TurnRole::Assistant, None) => messages.push(Message::assistant(turn.content())),
            (TurnRole::ToolResult, Some(call)) if requested_prev(turns, i) => {
                messages.push(Message::tool_result(&call.id, turn.content()));
            }
            (TurnRole::ToolResult, _) => messages.push(Message::user(&turn.transcript_line())),
        }
    }
    messages
}

fn call_id(turn: &ConversationTurn) -> Option<&str> {
    turn.tool_call().map(|c| c.id.as_str())
}

fn answered_next(turns: &[ConversationTurn], i: usize) -> bool {
    turns
        .get(i + 1)
        .is_some_and(|next| next.role() == TurnRole::ToolResult && call_id(next) == call_id(&turns[i]))
}

fn requested_prev(turns: &[ConversationTurn], i: usize) -> bool {
    i > 0 && {
        let prev = &turns[i - 1];
        prev.role() == TurnRole::Assistant && prev.tool_call().is_some() && call_id(prev) == call_id(&turns[i])
    }
}
