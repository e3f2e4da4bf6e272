//! Inbound email representation.
//!
//! Every email carries a stable id. Callers may supply one; otherwise it is
//! derived from the content, so a redelivered email maps to the same id.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid address regex")
});

/// An email handed to a triage session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Stable identifier used for deduplication and per-email side-effect keys
    pub id: String,
    /// Raw sender header, e.g. `Jane Doe <jane@acme.io>`
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

impl InboundEmail {
    /// An email known only by its raw text.
    pub fn from_text(body: impl Into<String>) -> Self {
        let body = body.into();
        let id = derive_email_id(None, None, &body);
        Self {
            id,
            sender: None,
            subject: None,
            body,
        }
    }

    /// An email with structured headers.
    pub fn new(sender: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let sender = sender.into();
        let subject = subject.into();
        let body = body.into();
        let id = derive_email_id(Some(&sender), Some(&subject), &body);
        Self {
            id,
            sender: Some(sender),
            subject: Some(subject),
            body,
        }
    }

    /// Replace the derived id with a caller-supplied one. Blank ids are ignored.
    pub fn with_id(mut self, id: Option<String>) -> Self {
        if let Some(id) = id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            self.id = id;
        }
        self
    }

    /// The bare sender address, from the sender header or the first address
    /// found in the body.
    pub fn sender_address(&self) -> Option<String> {
        self.sender
            .as_deref()
            .and_then(extract_address)
            .or_else(|| extract_address(&self.body))
    }

    /// The sender's display name, when the header has one.
    pub fn sender_name(&self) -> Option<String> {
        let sender = self.sender.as_deref()?;
        let name = sender.split('<').next()?.trim().trim_matches('"').trim();
        if name.is_empty() || name.contains('@') {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// The user turn that opens a session.
    pub fn framed_input(&self) -> String {
        let mut text = String::from("New email received:\n");
        if let Some(sender) = &self.sender {
            text.push_str(&format!("From: {}\n", sender));
        }
        if let Some(subject) = &self.subject {
            text.push_str(&format!("Subject: {}\n", subject));
        }
        if self.sender.is_some() || self.subject.is_some() {
            text.push('\n');
        }
        text.push_str(self.body.trim());
        text
    }
}

/// First email address in `text`, lowercased.
pub fn extract_address(text: &str) -> Option<String> {
    ADDRESS_RE
        .find(text)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Content-derived id: hex SHA-256 over sender, subject and body.
pub fn derive_email_id(sender: Option<&str>, subject: Option<&str>, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender.unwrap_or_default().trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(subject.unwrap_or_default().trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(body.trim().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("sha256:{}", &digest[..32])
}
