//! Exponential backoff between model attempts.
//!
//! The delay for attempt `n` (0-indexed) is
//! `min(base_delay_ms * 2^n + jitter, max_delay_ms)`.

use std::time::Duration;

/// Backoff schedule shared by every retrying caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl Backoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before retry `attempt`, including jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(compute_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            jitter_ms(self.base_delay_ms),
        ))
    }

    pub async fn sleep(&self, attempt: u32) {
        tokio::time::sleep(self.delay(attempt)).await;
    }
}

/// Nanosecond component of the clock as a cheap jitter source.
fn jitter_ms(base_delay_ms: u64) -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % base_delay_ms.max(1))
        .unwrap_or(0)
}

/// Compute the backoff delay for a given attempt (without sleeping).
pub fn compute_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
    exponential.saturating_add(jitter_ms).min(max_delay_ms)
}
