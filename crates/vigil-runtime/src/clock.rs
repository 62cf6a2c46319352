//! Time source for rate limiting, backoff and circuit recovery.
//!
//! All waiting in the runtime goes through a [`Clock`] so tests can swap
//! in a [`ManualClock`] and assert on elapsed time without sleeping.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Monotonic time source.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Wait until `now() >= deadline`.
    async fn sleep_until(&self, deadline: Duration);

    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }
}

/// Wall clock backed by tokio time.
#[derive(Debug)]
pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep_until(&self, deadline: Duration) {
        tokio::time::sleep_until(self.origin + deadline).await;
    }
}

/// Clock that only moves when something sleeps on it or it is advanced.
///
/// Sleeping jumps the clock forward to the deadline, so a test observes
/// exactly the waits the code under test requested.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Every non-zero wait requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    async fn sleep_until(&self, deadline: Duration) {
        {
            let mut now = self.now.lock();
            if deadline > *now {
                self.sleeps.lock().push(deadline - *now);
                *now = deadline;
            }
        }
        tokio::task::yield_now().await;
    }
}
