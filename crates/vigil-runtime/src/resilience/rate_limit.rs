//! Global request pacing.
//!
//! Every request to the literature service, retries and follow-up
//! requests of a multi-step query included, reserves a slot from one
//! shared [`RateLimiter`] through a [`crate::literature::RequestPacer`]. Slots are at least
//! `min_interval` apart, so N requests span at least `(N - 1) * min_interval`
//! regardless of how many tasks issue them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Request budget per minute across the whole process
    pub requests_per_minute: u32,
}

impl RateLimitConfig {
    /// Minimum spacing between two requests.
    ///
    /// Zero requests per minute is rejected by config validation; here it
    /// maps to no pacing.
    pub fn min_interval(&self) -> Duration {
        if self.requests_per_minute == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(60) / self.requests_per_minute
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // NCBI allows 3 requests/second without an API key
        Self {
            requests_per_minute: 180,
        }
    }
}

/// Shared pacing gate.
pub struct RateLimiter {
    min_interval: Duration,
    last_slot: Mutex<Option<Duration>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_slot: Mutex::new(None),
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.min_interval(), clock)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next free slot. Returns how long the caller waited.
    ///
    /// The slot is reserved before sleeping, so concurrent callers queue
    /// behind each other instead of waking together.
    pub async fn acquire(&self) -> Duration {
        let now = self.clock.now();
        let slot = {
            let mut last = self.last_slot.lock();
            let slot = match *last {
                Some(previous) => now.max(previous + self.min_interval),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        let wait = slot.saturating_sub(now);
        if !wait.is_zero() {
            tracing::trace!(wait = ?wait, "Waiting for rate limit slot");
            self.clock.sleep_until(slot).await;
        }
        wait
    }
}
