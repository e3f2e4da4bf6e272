//! Escalation sink: the human-facing end of the escalation topic.
//!
//! Every [`EscalationRecord`] published by the `Escalate` tool is written to
//! the log at warn level with its email id, priority and reason, so an
//! operator tailing the logs (or a log shipper alerting on them) sees it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::bus::{NotificationBus, Subscription};
use crate::tools::EscalationRecord;

pub struct EscalationLog {
    subscription: Subscription,
}

impl EscalationLog {
    /// Subscribe to `topic` now, so escalations published before `spawn`
    /// are not lost.
    pub fn new(bus: &Arc<NotificationBus>, topic: &str) -> Self {
        Self {
            subscription: bus.subscribe(topic),
        }
    }

    /// Log escalations until `shutdown` becomes true or the topic closes.
    /// The task resolves to the number of escalations handled.
    pub fn spawn(mut self, shutdown: watch::Receiver<bool>) -> JoinHandle<usize> {
        tokio::spawn(
            async move {
                let mut stop = shutdown;
                let mut handled = 0;
                info!(topic = %self.subscription.topic(), "Escalation log started");
                loop {
                    let notification = tokio::select! {
                        _ = stop.wait_for(|v| *v) => break,
                        n = self.subscription.recv() => match n {
                            Some(n) => n,
                            None => break,
                        },
                    };

                    match notification.decode::<EscalationRecord>() {
                        Ok(record) => {
                            handled += 1;
                            warn!(
                                escalation_id = %record.id,
                                email_id = %record.email_id,
                                priority = %record.priority,
                                sender = record.sender.as_deref().unwrap_or("-"),
                                subject = record.subject.as_deref().unwrap_or("-"),
                                reason = %record.reason,
                                "Email escalated for human attention"
                            );
                        }
                        Err(e) => {
                            warn!(notification_id = %notification.id, error = %e, "Ignoring malformed escalation");
                        }
                    }
                }
                info!(handled, "Escalation log stopped");
                handled
            }
            .in_current_span(),
        )
    }
}
