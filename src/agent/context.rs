//! System prompt construction.
//!
//! The default prompt casts the model as the inbox assistant of a named
//! person, lists the triage tools and when each applies, and appends a
//! runtime context block for the email being handled.

use crate::config::AgentDefaults;

/// Per-session facts appended to the system prompt.
///
/// ```rust
/// use inboxpilot::agent::RuntimeContext;
///
/// let ctx = RuntimeContext::new()
///     .with_email_id("msg-42")
///     .with_tools(vec!["CategoriseEmail".to_string(), "Escalate".to_string()]);
/// let rendered = ctx.render().unwrap();
/// assert!(rendered.starts_with("## Runtime Context"));
/// assert!(rendered.contains("Email id: msg-42"));
/// assert!(rendered.contains("CategoriseEmail, Escalate"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    pub email_id: Option<String>,
    pub sender: Option<String>,
    pub available_tools: Vec<String>,
    /// RFC 3339 timestamp
    pub current_time: Option<String>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email_id(mut self, id: &str) -> Self {
        self.email_id = Some(id.to_string());
        self
    }

    pub fn with_sender(mut self, sender: Option<String>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.available_tools = tools;
        self
    }

    pub fn with_current_time(mut self) -> Self {
        self.current_time = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.email_id.is_none()
            && self.sender.is_none()
            && self.available_tools.is_empty()
            && self.current_time.is_none()
    }

    /// Markdown section for the system prompt, `None` when nothing is set.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        if let Some(ref id) = self.email_id {
            parts.push(format!("- Email id: {}", id));
        }
        if let Some(ref sender) = self.sender {
            parts.push(format!("- Sender: {}", sender));
        }
        if !self.available_tools.is_empty() {
            parts.push(format!("- Available tools: {}", self.available_tools.join(", ")));
        }
        if let Some(ref time) = self.current_time {
            parts.push(format!("- Current time: {}", time));
        }
        Some(format!("## Runtime Context\n\n{}", parts.join("\n")))
    }
}

/// The persona prompt for the given assistant identity.
pub fn persona_prompt(name: &str, role: &str) -> String {
    format!(
        "You are an email inbox assistant of {name}, who is {role}.\n\
         Your goal is to handle all the incoming emails by categorising them based on \
         guideline and decide on next steps.\n\n\
         Guidelines:\n\
         - Start with CategoriseEmail.\n\
         - For sales leads, use ProspectResearch on the sender if it helps, then \
         GenerateEmailResponse and CreateEmailDraft so {name} can review before sending.\n\
         - For urgent support issues or complaints, use Escalate with a clear reason.\n\
         - Ignore spam: no reply, no draft.\n\
         - Only use ReplyEmail when an immediate answer is clearly appropriate. \
         A reply can be sent once per email.\n\
         - If a tool fails, decide on a different action instead of repeating it.\n\
         - When finished, answer with a short summary of what you did. Do not call \
         more tools after that.",
    )
}

/// Assemble the system prompt: the configured override or the persona
/// prompt, followed by the runtime context.
pub fn build_system_prompt(defaults: &AgentDefaults, runtime: &RuntimeContext) -> String {
    let base = match defaults.system_prompt.as_deref().map(str::trim) {
        Some(custom) if !custom.is_empty() => custom.to_string(),
        _ => persona_prompt(&defaults.assistant_name, &defaults.assistant_role),
    };
    match runtime.render() {
        Some(ctx) => format!("{}\n\n{}", base, ctx),
        None => base,
    }
}
