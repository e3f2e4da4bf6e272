//! GenerateEmailResponse tool: writes reply text without sending or saving it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::ModelClient;

use super::{optional_str, required_str, Tool, ToolCategory, ToolContext, ToolFailure};

const WRITER_PROMPT: &str = "You write email replies on behalf of an inbox assistant. \
Reply with the email body only: no subject line, no commentary.";

pub struct GenerateEmailResponseTool {
    model: Arc<dyn ModelClient>,
    signature: String,
}

impl GenerateEmailResponseTool {
    pub fn new(model: Arc<dyn ModelClient>, signature: impl Into<String>) -> Self {
        Self {
            model,
            signature: signature.into(),
        }
    }
}

#[async_trait]
impl Tool for GenerateEmailResponseTool {
    fn name(&self) -> &str {
        "GenerateEmailResponse"
    }

    fn description(&self) -> &str {
        "Write the text of a reply to the inbound email from instructions. Does not send \
         or save anything; pass the result to CreateEmailDraft or ReplyEmail."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instructions": {
                    "type": "string",
                    "minLength": 1,
                    "description": "What the reply should achieve and include"
                },
                "tone": {
                    "type": "string",
                    "description": "e.g. friendly, formal, apologetic"
                }
            },
            "required": ["instructions"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Generation
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let instructions = required_str(&args, "instructions")?;
        let tone = optional_str(&args, "tone").unwrap_or("professional");

        let prompt = format!(
            "{}\n\nInstructions: {}\nTone: {}\nSign off as: {}",
            ctx.email.framed_input(),
            instructions,
            tone,
            self.signature
        );
        let reply = self
            .model
            .complete(WRITER_PROMPT, &prompt)
            .await
            .map_err(|e| ToolFailure::execution(format!("reply generation failed: {}", e)))?;

        Ok(json!({ "reply": reply.trim() }))
    }
}
