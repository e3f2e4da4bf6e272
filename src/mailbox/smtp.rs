//! SMTP mailbox (feature `smtp`).
//!
//! Replies go out through a STARTTLS relay. Drafts are kept on disk when a
//! drafts directory is configured, otherwise in memory.

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::{PilotError, Result};

use super::{
    domain_of, new_message_id, DraftReceipt, FileMailbox, InMemoryMailbox, Mailbox, MailboxError,
    OutgoingEmail, SentReceipt,
};

pub struct SmtpMailbox {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    drafts: Box<dyn Mailbox>,
}

impl SmtpMailbox {
    pub fn new(config: &SmtpConfig, from: &str, drafts: Option<FileMailbox>) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(PilotError::Config("mailbox.smtp.host is empty".into()));
        }
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| PilotError::Config(format!("SMTP relay {}: {}", config.host, e)))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        let drafts: Box<dyn Mailbox> = match drafts {
            Some(file) => Box::new(file),
            None => Box::new(InMemoryMailbox::new()),
        };

        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
            drafts,
        })
    }

    fn build_message(&self, email: &OutgoingEmail, message_id: &str) -> std::result::Result<Message, MailboxError> {
        let to = email
            .to
            .as_deref()
            .ok_or_else(|| MailboxError::Rejected("reply has no recipient address".into()))?;
        let from = if email.from.is_empty() { &self.from } else { &email.from };

        Message::builder()
            .from(from.parse().map_err(|e| MailboxError::Rejected(format!("from address: {}", e)))?)
            .to(to.parse().map_err(|e| MailboxError::Rejected(format!("to address: {}", e)))?)
            .subject(email.subject.clone())
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailboxError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl Mailbox for SmtpMailbox {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<SentReceipt, MailboxError> {
        let message_id = new_message_id(domain_of(&self.from));
        let message = self.build_message(email, &message_id)?;

        match self.transport.send(message).await {
            Ok(response) => {
                info!(code = %response.code(), message_id = %message_id, "SMTP reply accepted");
                Ok(SentReceipt {
                    message_id,
                    sent_at: Utc::now(),
                })
            }
            // The server answered with a refusal code.
            Err(e) if e.is_permanent() || e.is_transient() => {
                Err(MailboxError::Rejected(e.to_string()))
            }
            Err(e) => Err(MailboxError::InDoubt(e.to_string())),
        }
    }

    async fn save_draft(&self, email: &OutgoingEmail) -> std::result::Result<DraftReceipt, MailboxError> {
        self.drafts.save_draft(email).await
    }
}
