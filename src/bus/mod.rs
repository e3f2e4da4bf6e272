//! Notification Bus Module
//!
//! Topic-based publish/subscribe used for escalation alerts, queued
//! new-mail events and background triage results.
//!
//! ```text
//! ┌─────────────┐  publish   ┌─────────────────┐  recv   ┌──────────────┐
//! │  Escalate   │──────────> │ NotificationBus │───────> │  subscriber  │
//! │  /gateway   │   topic    │  (per topic)    │         │  (on-call)   │
//! └─────────────┘            └─────────────────┘         └──────────────┘
//! ```
//!
//! Each topic is a bounded broadcast channel. Publishing to a topic with no
//! live subscribers succeeds and reaches nobody.
//!
//! # Example
//!
//! ```
//! use inboxpilot::bus::NotificationBus;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = NotificationBus::new();
//!     let mut alerts = bus.subscribe("inboxpilot/escalations");
//!
//!     let delivered = bus.publish("inboxpilot/escalations", json!({"reason": "vip"})).unwrap();
//!     assert_eq!(delivered, 1);
//!
//!     let note = alerts.recv().await.unwrap();
//!     assert_eq!(note.payload["reason"], "vip");
//! }
//! ```

pub mod message;

pub use message::{NewMailEvent, Notification, TriageOutcome};

use std::collections::HashMap;
use std::sync::Mutex;

use futures::Stream;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{PilotError, Result};

/// Default buffer size per topic
const DEFAULT_BUFFER_SIZE: usize = 100;

/// Topic-keyed broadcast bus.
pub struct NotificationBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Notification>>>,
    buffer_size: usize,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Notification> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }

    /// Publish `payload` on `topic`. Returns how many subscribers received it.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<usize> {
        if topic.trim().is_empty() {
            return Err(PilotError::Bus("topic must not be empty".into()));
        }
        let note = Notification::new(topic, payload);
        match self.sender(topic).send(note) {
            Ok(delivered) => {
                debug!(topic, delivered, "Published notification");
                Ok(delivered)
            }
            // No live receivers
            Err(_) => {
                debug!(topic, "Published notification with no subscribers");
                Ok(0)
            }
        }
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: topic.to_string(),
            rx: self.sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// A receiver for one topic.
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<Notification>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next notification. Skips over messages lost to lag; `None` once the
    /// bus is dropped.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(note) => return Some(note),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscriber lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Notification> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|note| (note, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = NotificationBus::new();
        assert_eq!(bus.publish("t", json!({})).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let bus = NotificationBus::new();
        assert!(bus.publish("  ", json!({})).is_err());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = NotificationBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        bus.publish("a", json!(1)).unwrap();
        bus.publish("b", json!(2)).unwrap();

        assert_eq!(a.recv().await.unwrap().payload, json!(1));
        assert_eq!(b.recv().await.unwrap().payload, json!(2));
        assert_eq!(bus.subscriber_count("a"), 1);
        assert_eq!(bus.subscriber_count("missing"), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let bus = NotificationBus::with_buffer_size(2);
        let mut sub = bus.subscribe("t");
        for i in 0..5 {
            bus.publish("t", json!(i)).unwrap();
        }
        let note = sub.recv().await.unwrap();
        assert_eq!(note.payload, json!(3));
    }

    #[tokio::test]
    async fn test_stream_yields_in_order() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe("t");
        bus.publish("t", json!("x")).unwrap();
        bus.publish("t", json!("y")).unwrap();

        let notes: Vec<_> = sub.into_stream().take(2).collect().await;
        assert_eq!(notes[0].payload, json!("x"));
        assert_eq!(notes[1].payload, json!("y"));
    }
}
