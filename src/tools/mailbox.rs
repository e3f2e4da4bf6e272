//! ReplyEmail and CreateEmailDraft tools.
//!
//! Both address the sender of the inbound email. Sending goes through the
//! session ledger so one session sends at most one reply; drafting overwrites
//! the pending draft for the email.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::email::InboundEmail;
use crate::mailbox::{Mailbox, MailboxError, OutgoingEmail};

use super::ledger::SendGate;
use super::{optional_str, required_str, Tool, ToolCategory, ToolContext, ToolFailure, ToolFailureKind};

fn reply_subject(email: &InboundEmail, requested: Option<&str>) -> String {
    if let Some(subject) = requested {
        return subject.to_string();
    }
    match email.subject.as_deref().map(str::trim) {
        Some(s) if s.to_ascii_lowercase().starts_with("re:") => s.to_string(),
        Some(s) if !s.is_empty() => format!("Re: {}", s),
        _ => "Re: your email".to_string(),
    }
}

fn outgoing(args: &Value, ctx: &ToolContext, from: &str) -> Result<OutgoingEmail, ToolFailure> {
    let body = required_str(args, "body")?;
    Ok(OutgoingEmail {
        in_reply_to: ctx.email_id().to_string(),
        from: from.to_string(),
        to: ctx.email.sender_address(),
        subject: reply_subject(&ctx.email, optional_str(args, "subject")),
        body: body.to_string(),
    })
}

fn reply_parameters(body_description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "body": {
                "type": "string",
                "minLength": 1,
                "description": body_description
            },
            "subject": {
                "type": "string",
                "description": "Defaults to 'Re: <original subject>'"
            }
        },
        "required": ["body"]
    })
}

/// Sends a reply immediately. At most one send per session.
pub struct ReplyEmailTool {
    mailbox: Arc<dyn Mailbox>,
    from: String,
}

impl ReplyEmailTool {
    pub fn new(mailbox: Arc<dyn Mailbox>, from: impl Into<String>) -> Self {
        Self {
            mailbox,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Tool for ReplyEmailTool {
    fn name(&self) -> &str {
        "ReplyEmail"
    }

    fn description(&self) -> &str {
        "Send a reply to the sender right away. Only one reply can be sent per email; \
         prefer CreateEmailDraft unless an immediate answer is clearly appropriate."
    }

    fn parameters(&self) -> Value {
        reply_parameters("Full reply text to send")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Send
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let email = outgoing(&args, ctx, &self.from)?;
        if email.to.is_none() {
            return Err(ToolFailure::execution("inbound email has no sender address to reply to"));
        }

        match ctx.ledger.begin_send() {
            SendGate::Proceed => {}
            SendGate::AlreadySent(receipt) => {
                info!(email_id = %ctx.email_id(), "Reply already sent, not sending again");
                return Ok(json!({ "status": "already_sent", "receipt": receipt }));
            }
            SendGate::InDoubt => {
                return Err(ToolFailure::new(
                    ToolFailureKind::SendInDoubt,
                    "an earlier send attempt has an unknown outcome; not sending again",
                ));
            }
        }

        match self.mailbox.send(&email).await {
            Ok(receipt) => {
                let receipt = json!({
                    "message_id": receipt.message_id,
                    "sent_at": receipt.sent_at,
                    "to": email.to,
                    "subject": email.subject,
                });
                ctx.ledger.complete_send(receipt.clone());
                info!(email_id = %ctx.email_id(), mailbox = self.mailbox.name(), "Reply sent");
                Ok(json!({ "status": "sent", "receipt": receipt }))
            }
            Err(MailboxError::InDoubt(msg)) => {
                warn!(email_id = %ctx.email_id(), error = %msg, "Reply outcome unknown");
                Err(ToolFailure::new(ToolFailureKind::SendInDoubt, msg))
            }
            Err(e) => {
                ctx.ledger.abort_send();
                Err(ToolFailure::execution(format!("reply not sent: {}", e)))
            }
        }
    }
}

/// Saves a reply for human review. One draft per email, latest wins.
pub struct CreateEmailDraftTool {
    mailbox: Arc<dyn Mailbox>,
    from: String,
}

impl CreateEmailDraftTool {
    pub fn new(mailbox: Arc<dyn Mailbox>, from: impl Into<String>) -> Self {
        Self {
            mailbox,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Tool for CreateEmailDraftTool {
    fn name(&self) -> &str {
        "CreateEmailDraft"
    }

    fn description(&self) -> &str {
        "Save a reply as a draft for review without sending it. Saving again replaces \
         the previous draft for this email."
    }

    fn parameters(&self) -> Value {
        reply_parameters("Full draft text")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Draft
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let email = outgoing(&args, ctx, &self.from)?;
        let receipt = self
            .mailbox
            .save_draft(&email)
            .await
            .map_err(|e| ToolFailure::execution(format!("draft not saved: {}", e)))?;
        info!(email_id = %ctx.email_id(), draft_id = %receipt.draft_id, replaced = receipt.replaced, "Draft saved");
        Ok(json!({
            "status": "drafted",
            "draft_id": receipt.draft_id,
            "replaced": receipt.replaced,
            "subject": email.subject,
        }))
    }
}
