//! Per-session side-effect ledger.
//!
//! Records which non-idempotent actions already happened for an email so a
//! repeated model request does not send a second reply or notify twice.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum SendState {
    NotSent,
    /// A send was dispatched and its outcome is unknown.
    Attempted,
    Sent(Value),
}

/// What a send tool should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum SendGate {
    Proceed,
    AlreadySent(Value),
    InDoubt,
}

/// Side-effect records for one session.
#[derive(Debug)]
pub struct SessionLedger {
    send: Mutex<SendState>,
    escalations: Mutex<HashMap<String, Value>>,
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLedger {
    pub fn new() -> Self {
        Self {
            send: Mutex::new(SendState::NotSent),
            escalations: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the right to send. Only the first caller gets `Proceed`; the
    /// state moves to attempted until `complete_send` or `abort_send`.
    pub fn begin_send(&self) -> SendGate {
        let mut state = self.send.lock().unwrap();
        match &*state {
            SendState::NotSent => {
                *state = SendState::Attempted;
                SendGate::Proceed
            }
            SendState::Attempted => SendGate::InDoubt,
            SendState::Sent(receipt) => SendGate::AlreadySent(receipt.clone()),
        }
    }

    pub fn complete_send(&self, receipt: Value) {
        *self.send.lock().unwrap() = SendState::Sent(receipt);
    }

    /// The provider definitively rejected the send; allow another attempt.
    pub fn abort_send(&self) {
        let mut state = self.send.lock().unwrap();
        if *state == SendState::Attempted {
            *state = SendState::NotSent;
        }
    }

    pub fn sent_receipt(&self) -> Option<Value> {
        match &*self.send.lock().unwrap() {
            SendState::Sent(receipt) => Some(receipt.clone()),
            _ => None,
        }
    }

    pub fn escalation(&self, email_id: &str) -> Option<Value> {
        self.escalations.lock().unwrap().get(email_id).cloned()
    }

    pub fn record_escalation(&self, email_id: &str, record: Value) {
        self.escalations
            .lock()
            .unwrap()
            .insert(email_id.to_string(), record);
    }
}
