//! CategoriseEmail tool.
//!
//! Asks the model to label the inbound email. The label set is fixed; any
//! label outside it is reported as `other`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::ModelClient;

use super::{optional_str, Tool, ToolCategory, ToolContext, ToolFailure, ToolFailureKind};

pub const LABELS: &[&str] = &["sales_lead", "support", "spam", "personal", "other"];
pub const URGENCIES: &[&str] = &["low", "normal", "high"];

const CLASSIFIER_PROMPT: &str = "You classify emails for an inbox assistant. Reply with a JSON object \
only: {\"label\": one of sales_lead | support | spam | personal | other, \
\"urgency\": one of low | normal | high, \"rationale\": one sentence}.";

#[derive(Debug, Deserialize)]
struct Classification {
    label: String,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Classifies the email into [`LABELS`] with an urgency and a rationale.
pub struct CategoriseEmailTool {
    model: Arc<dyn ModelClient>,
}

impl CategoriseEmailTool {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

/// Pull the JSON object out of a model reply that may wrap it in prose or a
/// code fence.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn normalize(value: Option<String>, allowed: &[&str], fallback: &str) -> String {
    value
        .map(|v| v.trim().to_lowercase().replace([' ', '-'], "_"))
        .filter(|v| allowed.contains(&v.as_str()))
        .unwrap_or_else(|| fallback.to_string())
}

#[async_trait]
impl Tool for CategoriseEmailTool {
    fn name(&self) -> &str {
        "CategoriseEmail"
    }

    fn description(&self) -> &str {
        "Classify the inbound email as sales_lead, support, spam, personal or other, \
         with an urgency level and a short rationale. Call this first."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hint": {
                    "type": "string",
                    "description": "Optional context worth considering, e.g. what the sender seems to want"
                }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Classification
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let mut prompt = ctx.email.framed_input();
        if let Some(hint) = optional_str(&args, "hint") {
            prompt.push_str(&format!("\n\nAssistant note: {}", hint));
        }

        let reply = self
            .model
            .complete(CLASSIFIER_PROMPT, &prompt)
            .await
            .map_err(|e| ToolFailure::execution(format!("classification failed: {}", e)))?;

        let parsed: Classification = extract_json_object(&reply)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .ok_or_else(|| {
                ToolFailure::new(
                    ToolFailureKind::ExecutionFailed,
                    format!("classifier reply was not a JSON object: {}", reply.trim()),
                )
            })?;

        let label = normalize(Some(parsed.label), LABELS, "other");
        let urgency = normalize(parsed.urgency, URGENCIES, "normal");
        debug!(email_id = %ctx.email_id(), label = %label, urgency = %urgency, "Email categorised");

        Ok(json!({
            "label": label,
            "urgency": urgency,
            "rationale": parsed.rationale.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ModelDecision;
    use crate::email::InboundEmail;
    use crate::error::ModelError;
    use crate::memory::MemorySnapshot;
    use crate::providers::ToolDefinition;

    struct Reply(&'static str);

    #[async_trait]
    impl ModelClient for Reply {
        async fn infer(
            &self,
            _system: &str,
            _memory: MemorySnapshot<'_>,
            _tools: &[ToolDefinition],
        ) -> Result<ModelDecision, ModelError> {
            unreachable!("categorise only completes")
        }

        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(InboundEmail::from_text("Hi, I'd like info about your pricing")))
    }

    #[tokio::test]
    async fn test_categorise_parses_fenced_json() {
        let tool = CategoriseEmailTool::new(Arc::new(Reply(
            "```json\n{\"label\": \"sales_lead\", \"urgency\": \"High\", \"rationale\": \"asks for pricing\"}\n```",
        )));
        let out = tool.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(out["label"], "sales_lead");
        assert_eq!(out["urgency"], "high");
        assert_eq!(out["rationale"], "asks for pricing");
    }

    #[tokio::test]
    async fn test_unknown_label_becomes_other() {
        let tool = CategoriseEmailTool::new(Arc::new(Reply("{\"label\": \"newsletter\"}")));
        let out = tool.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(out["label"], "other");
        assert_eq!(out["urgency"], "normal");
    }

    #[tokio::test]
    async fn test_non_json_reply_is_failure() {
        let tool = CategoriseEmailTool::new(Arc::new(Reply("it is probably spam")));
        let err = tool.execute(json!({}), &ctx()).await.unwrap_err();
        assert_eq!(err.kind, ToolFailureKind::ExecutionFailed);
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\":1} y"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("no json"), None);
    }
}
