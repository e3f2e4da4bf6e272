use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Result of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<V> {
    /// First sighting; the caller owns the work and must `complete` or `forget`.
    New,
    /// Another request with this key is still being processed.
    InFlight,
    /// A finished response for this key, still within the TTL.
    Completed(V),
}

#[derive(Debug)]
enum Slot<V> {
    InFlight,
    Completed(V),
}

#[derive(Debug)]
struct Entry<V> {
    recorded_at: Instant,
    slot: Slot<V>,
}

/// In-memory idempotency store for request deduplication.
///
/// Keys are email ids. A key is in flight from `claim` until `complete`,
/// after which the stored response is replayed for `ttl`.
pub struct IdempotencyStore<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> IdempotencyStore<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Claim `key`, recording it as in flight when new.
    pub fn claim(&self, key: &str) -> Claim<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get(key) {
            match &entry.slot {
                Slot::InFlight => return Claim::InFlight,
                Slot::Completed(v) if now.duration_since(entry.recorded_at) < self.ttl => {
                    return Claim::Completed(v.clone());
                }
                Slot::Completed(_) => {}
            }
        }

        // In-flight entries are never expired; their owner still holds them.
        let ttl = self.ttl;
        entries.retain(|_, e| {
            matches!(e.slot, Slot::InFlight) || now.duration_since(e.recorded_at) < ttl
        });

        if entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .filter(|(_, e)| matches!(e.slot, Slot::Completed(_)))
                .min_by_key(|(_, e)| e.recorded_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                recorded_at: now,
                slot: Slot::InFlight,
            },
        );
        Claim::New
    }

    /// Store the finished response for `key`.
    pub fn complete(&self, key: &str, value: V) {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                recorded_at: Instant::now(),
                slot: Slot::Completed(value),
            },
        );
    }

    /// Drop `key` so the next request with it is processed again.
    pub fn forget(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Number of tracked entries (for testing/metrics).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
