//! Background triage worker for the notification-driven path.
//!
//! Subscribes to the new-mail topic, runs one session per event and
//! publishes a [`TriageOutcome`] on `<topic>.results`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::agent::{SessionReport, TriageAgent};
use crate::bus::{NewMailEvent, NotificationBus, Subscription, TriageOutcome};

use super::idempotency::{Claim, IdempotencyStore};
use super::server::{should_cache, CachedResponse};

/// Topic on which outcomes for `topic` are published.
pub fn results_topic(topic: &str) -> String {
    format!("{}.results", topic)
}

impl From<&SessionReport> for TriageOutcome {
    fn from(report: &SessionReport) -> Self {
        TriageOutcome {
            email_id: report.email_id.clone(),
            session_id: report.session_id.clone(),
            state: if report.is_done() { "done" } else { "failed" }.to_string(),
            output: report.output.clone(),
            failure: report.detail(),
        }
    }
}

pub struct TriageWorker {
    agent: Arc<TriageAgent>,
    bus: Arc<NotificationBus>,
    dedup: Arc<IdempotencyStore<CachedResponse>>,
    subscription: Subscription,
    results_topic: String,
}

impl TriageWorker {
    /// Subscribe to `topic` now, so events published before `spawn` are
    /// not lost.
    pub fn new(
        agent: Arc<TriageAgent>,
        bus: Arc<NotificationBus>,
        dedup: Arc<IdempotencyStore<CachedResponse>>,
        topic: &str,
    ) -> Self {
        Self {
            subscription: bus.subscribe(topic),
            results_topic: results_topic(topic),
            agent,
            bus,
            dedup,
        }
    }

    /// Run until `shutdown` becomes true or the topic closes. Each event runs
    /// in its own task; shutdown cancels sessions still running.
    pub fn spawn(mut self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                let mut stop = shutdown.clone();
                info!(topic = %self.subscription.topic(), "Triage worker started");
                loop {
                    let notification = tokio::select! {
                        _ = stop.wait_for(|v| *v) => break,
                        n = self.subscription.recv() => match n {
                            Some(n) => n,
                            None => break,
                        },
                    };

                    let event: NewMailEvent = match notification.decode() {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(notification_id = %notification.id, error = %e, "Ignoring malformed new-mail event");
                            continue;
                        }
                    };
                    self.dispatch(event, shutdown.clone());
                }
                info!("Triage worker stopped");
            }
            .in_current_span(),
        )
    }

    fn dispatch(&self, event: NewMailEvent, cancel: watch::Receiver<bool>) {
        let email_id = event.email.id.clone();
        match self.dedup.claim(&email_id) {
            Claim::New => {}
            _ => {
                debug!(email_id = %email_id, "Skipping duplicate new-mail event");
                return;
            }
        }

        let agent = Arc::clone(&self.agent);
        let bus = Arc::clone(&self.bus);
        let dedup = Arc::clone(&self.dedup);
        let topic = self.results_topic.clone();
        tokio::spawn(async move {
            let report = agent.triage(event.email, cancel).await;
            if should_cache(&report) {
                dedup.complete(&report.email_id, CachedResponse::from_report(&report));
            } else {
                dedup.forget(&report.email_id);
            }

            let outcome = TriageOutcome::from(&report);
            match serde_json::to_value(&outcome) {
                Ok(payload) => {
                    if let Err(e) = bus.publish(&topic, payload) {
                        warn!(email_id = %outcome.email_id, error = %e, "Could not publish triage outcome");
                    }
                }
                Err(e) => warn!(error = %e, "Could not encode triage outcome"),
            }
        });
    }
}
