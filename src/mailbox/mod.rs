//! Mailbox providers
//!
//! The [`Mailbox`] trait is the seam between the reply/draft tools and the
//! actual mail system. Backends:
//!
//! - [`InMemoryMailbox`]: records sends and drafts in memory (tests, `--dry-run`)
//! - [`FileMailbox`]: spools sent replies and drafts as JSON files
//! - `SmtpMailbox`: delivers replies over SMTP (feature `smtp`)

pub mod file;
#[cfg(feature = "smtp")]
pub mod smtp;

pub use file::FileMailbox;
#[cfg(feature = "smtp")]
pub use smtp::SmtpMailbox;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::MailboxConfig;
use crate::error::Result;

/// A reply or draft addressed back to the sender of an inbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    /// Id of the inbound email being answered
    pub in_reply_to: String,
    pub from: String,
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentReceipt {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReceipt {
    pub draft_id: String,
    /// An earlier draft for the same email was overwritten
    pub replaced: bool,
}

/// Send failures, split by whether the message may have gone out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailboxError {
    /// The provider refused the message; nothing was delivered.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Delivery outcome is unknown.
    #[error("outcome unknown: {0}")]
    InDoubt(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Outbound mail operations available to tools.
#[async_trait]
pub trait Mailbox: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<SentReceipt, MailboxError>;

    /// Save a draft. One draft per inbound email; saving again overwrites it.
    async fn save_draft(&self, email: &OutgoingEmail)
        -> std::result::Result<DraftReceipt, MailboxError>;
}

/// Draft key for an inbound email id.
pub fn draft_id_for(email_id: &str) -> String {
    let safe: String = email_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("draft-{}", safe)
}

fn new_message_id(domain: &str) -> String {
    format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
}

fn domain_of(address: &str) -> &str {
    address.rsplit_once('@').map(|(_, d)| d).unwrap_or("localhost")
}

/// Mailbox that keeps everything in memory.
///
/// Failures and delays can be injected for testing the reply path.
#[derive(Default)]
pub struct InMemoryMailbox {
    sent: Mutex<Vec<OutgoingEmail>>,
    drafts: Mutex<HashMap<String, OutgoingEmail>>,
    send_failures: Mutex<Vec<MailboxError>>,
    send_delay: Option<Duration>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every send by `delay`.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Fail the next send with `error`. Queued failures are used in order.
    pub fn fail_next_send(&self, error: MailboxError) {
        self.send_failures.lock().unwrap().push(error);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn draft(&self, email_id: &str) -> Option<OutgoingEmail> {
        self.drafts.lock().unwrap().get(&draft_id_for(email_id)).cloned()
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<SentReceipt, MailboxError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.send_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(SentReceipt {
            message_id: new_message_id(domain_of(&email.from)),
            sent_at: Utc::now(),
        })
    }

    async fn save_draft(
        &self,
        email: &OutgoingEmail,
    ) -> std::result::Result<DraftReceipt, MailboxError> {
        let draft_id = draft_id_for(&email.in_reply_to);
        let replaced = self
            .drafts
            .lock()
            .unwrap()
            .insert(draft_id.clone(), email.clone())
            .is_some();
        Ok(DraftReceipt { draft_id, replaced })
    }
}

/// Pick a mailbox backend from config.
pub fn from_config(config: &MailboxConfig) -> Result<Arc<dyn Mailbox>> {
    #[cfg(feature = "smtp")]
    if let Some(smtp) = &config.smtp {
        let drafts = config
            .drafts_dir
            .as_ref()
            .map(|dir| FileMailbox::new(PathBuf::from(dir)));
        info!(host = %smtp.host, "Using SMTP mailbox");
        return Ok(Arc::new(SmtpMailbox::new(smtp, &config.address, drafts)?));
    }

    match &config.drafts_dir {
        Some(dir) => {
            info!(dir = %dir, "Using file mailbox");
            Ok(Arc::new(FileMailbox::new(PathBuf::from(dir))))
        }
        None => {
            info!("Using in-memory mailbox");
            Ok(Arc::new(InMemoryMailbox::new()))
        }
    }
}
