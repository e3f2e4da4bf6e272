//! Escalate tool: flags the email for human attention.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::bus::NotificationBus;

use super::{optional_str, required_str, Tool, ToolCategory, ToolContext, ToolFailure};

const PRIORITIES: &[&str] = &["low", "normal", "high", "urgent"];

/// Published on the escalation topic and returned to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: String,
    pub email_id: String,
    pub reason: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Notifies humans through the notification bus. One escalation per email;
/// repeats return the first record. Fails when no subscriber received it, and
/// nothing is recorded, so a later call can try again.
pub struct EscalateTool {
    bus: Arc<NotificationBus>,
    topic: String,
}

impl EscalateTool {
    pub fn new(bus: Arc<NotificationBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Tool for EscalateTool {
    fn name(&self) -> &str {
        "Escalate"
    }

    fn description(&self) -> &str {
        "Flag the email for human attention with a clear reason. Use for urgent support \
         issues, complaints or anything the assistant should not handle alone."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Why a human needs to look at this email"
                },
                "priority": {
                    "type": "string",
                    "enum": PRIORITIES,
                    "description": "Defaults to high"
                }
            },
            "required": ["reason"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Notification
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let email_id = ctx.email_id();
        if let Some(prior) = ctx.ledger.escalation(email_id) {
            info!(email_id, "Email already escalated, returning prior record");
            return Ok(json!({ "status": "already_escalated", "escalation": prior }));
        }

        let reason = required_str(&args, "reason")?;
        let record = EscalationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email_id: email_id.to_string(),
            reason: reason.to_string(),
            priority: optional_str(&args, "priority").unwrap_or("high").to_string(),
            sender: ctx.email.sender.clone(),
            subject: ctx.email.subject.clone(),
            created_at: Utc::now(),
        };
        let record = serde_json::to_value(&record)
            .map_err(|e| ToolFailure::execution(format!("could not encode escalation: {}", e)))?;

        let delivered = self
            .bus
            .publish(&self.topic, record.clone())
            .map_err(|e| ToolFailure::execution(format!("escalation not delivered: {}", e)))?;
        if delivered == 0 {
            warn!(email_id, topic = %self.topic, "Escalation published with no listener");
            return Err(ToolFailure::execution(format!(
                "escalation not delivered: nobody is listening on {}",
                self.topic
            )));
        }
        info!(email_id, topic = %self.topic, delivered, "Email escalated");

        ctx.ledger.record_escalation(email_id, record.clone());
        Ok(json!({ "status": "escalated", "escalation": record }))
    }
}
