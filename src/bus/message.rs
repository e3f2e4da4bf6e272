//! Notification types carried on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::email::InboundEmail;

/// A message delivered on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification id
    pub id: String,
    pub topic: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(topic: &str, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        }
    }

    /// Decode the payload as `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Published when a new email should be triaged asynchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMailEvent {
    pub email: InboundEmail,
}

/// Published by the background worker when a queued session finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub email_id: String,
    pub session_id: String,
    /// `done` or `failed`
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}
