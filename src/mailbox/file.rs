//! File-backed mailbox.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/drafts/<draft-id>.json   one per inbound email, overwritten on save
//! <root>/outbox/<uuid>.json       one per sent reply
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::{domain_of, draft_id_for, new_message_id, DraftReceipt, Mailbox, MailboxError, OutgoingEmail, SentReceipt};

pub struct FileMailbox {
    root: PathBuf,
}

#[derive(Serialize)]
struct Spooled<'a, R: Serialize> {
    #[serde(flatten)]
    email: &'a OutgoingEmail,
    receipt: &'a R,
}

impl FileMailbox {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn draft_path(&self, email_id: &str) -> PathBuf {
        self.root
            .join("drafts")
            .join(format!("{}.json", draft_id_for(email_id)))
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join("outbox")
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), MailboxError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MailboxError::Storage(format!("{}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| MailboxError::Storage(e.to_string()))?;

        // Write then rename so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| MailboxError::Storage(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| MailboxError::Storage(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Mailbox for FileMailbox {
    fn name(&self) -> &str {
        "file"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<SentReceipt, MailboxError> {
        let receipt = SentReceipt {
            message_id: new_message_id(domain_of(&email.from)),
            sent_at: Utc::now(),
        };
        let path = self
            .outbox_dir()
            .join(format!("{}.json", uuid::Uuid::new_v4()));

        // A failed spool write means nothing left the process.
        Self::write_json(&path, &Spooled { email, receipt: &receipt })
            .await
            .map_err(|e| MailboxError::Rejected(e.to_string()))?;
        debug!(path = %path.display(), "Spooled reply");
        Ok(receipt)
    }

    async fn save_draft(&self, email: &OutgoingEmail) -> Result<DraftReceipt, MailboxError> {
        let path = self.draft_path(&email.in_reply_to);
        let replaced = tokio::fs::try_exists(&path).await.unwrap_or(false);
        let receipt = DraftReceipt {
            draft_id: draft_id_for(&email.in_reply_to),
            replaced,
        };
        Self::write_json(&path, &Spooled { email, receipt: &receipt }).await?;
        debug!(path = %path.display(), replaced, "Saved draft");
        Ok(receipt)
    }
}
