//! OpenAI Provider Implementation
//!
//! Implements `LLMProvider` for the Chat Completions API (and compatible
//! endpoints): message conversion, tool definitions, response parsing and
//! status-code error classification.
//!
//! # Example
//!
//! ```rust,ignore
//! use inboxpilot::providers::{openai::OpenAIProvider, ChatOptions, LLMProvider};
//! use inboxpilot::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![
//!         Message::system("You triage email."),
//!         Message::user("New email received:\nHi!"),
//!     ];
//!     let response = provider
//!         .chat(messages, vec![], None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!     println!("{}", response.content);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PilotError, ProviderError, Result};
use crate::session::{Message, Role};

use super::{parse_provider_error, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};

/// The OpenAI API endpoint URL.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MODEL: &str = "gpt-4o";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    /// One tool call per step; the agent executes tools sequentially.
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    /// Null for assistant turns that only carry tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    r#type: &'static str,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: &'static str,
    function: ToolDefinition,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallResponse {
    id: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// Chat Completions provider.
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider for the default OpenAI endpoint.
    ///
    /// ```
    /// use inboxpilot::providers::openai::OpenAIProvider;
    /// use inboxpilot::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_client(api_key, OPENAI_API_URL, Client::new())
    }

    /// Create a provider for an OpenAI-compatible endpoint. A trailing slash
    /// on `api_base` is ignored.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self::with_client(api_key, api_base, Client::new())
    }

    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let tool_calls = msg.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|tc| OpenAIToolCallRequest {
                        id: tc.id,
                        r#type: "function",
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            });
            let content = if msg.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(msg.content)
            };
            OpenAIMessage {
                role: role_name(msg.role),
                content,
                tool_calls,
                tool_call_id: msg.tool_call_id,
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|function| OpenAITool {
            r#type: "function",
            function,
        })
        .collect()
}

fn convert_response(response: OpenAIResponse) -> LLMResponse {
    let Some(choice) = response.choices.into_iter().next() else {
        return LLMResponse::default();
    };

    let content = choice.message.content.unwrap_or_default();
    let tool_calls: Vec<LLMToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| LLMToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
        .collect();

    let mut llm_response = LLMResponse::with_tools(&content, tool_calls);
    if let Some(usage) = response.usage {
        llm_response = llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    llm_response
}

/// Map a failed HTTP exchange to a classified error.
fn classify_error(status: u16, body: &str) -> PilotError {
    let detail = match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => match parsed.error.r#type {
            Some(kind) => format!("{} - {}", kind, parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) => body.to_string(),
    };
    PilotError::ProviderTyped(parse_provider_error(status, &detail))
}

fn transport_error(e: reqwest::Error) -> PilotError {
    if e.is_timeout() {
        PilotError::ProviderTyped(ProviderError::Timeout(e.to_string()))
    } else {
        PilotError::Provider(format!("OpenAI request failed: {}", e))
    }
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let has_tools = !tools.is_empty();

        let request = OpenAIRequest {
            model: model.to_string(),
            messages: convert_messages(messages),
            tools: has_tools.then(|| convert_tools(tools)),
            parallel_tool_calls: has_tools.then_some(false),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!(model, tools = has_tools, "OpenAI request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        let body = response.text().await.map_err(transport_error)?;
        let parsed: OpenAIResponse = serde_json::from_str(&body)?;
        debug!(model, "OpenAI response received");
        Ok(convert_response(parsed))
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn name(&self) -> &str {
        "openai"
    }
}
