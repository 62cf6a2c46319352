//! Retry policy for transient literature failures.
//!
//! Delay sequences come from `backon` builders; the client drives the
//! attempt loop itself so every attempt can pass through the rate limiter
//! and the injected clock.

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_str;

/// How the delay between attempts grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Constant {
        #[serde(with = "duration_str")]
        delay: Duration,
    },

    /// Delay starts at `min_delay` and is multiplied by `factor` each retry
    Exponential {
        #[serde(with = "duration_str")]
        min_delay: Duration,

        #[serde(with = "duration_str")]
        max_delay: Duration,

        factor: f32,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

/// Retry budget for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::Constant {
                delay: Duration::ZERO,
            },
        }
    }

    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Constant { delay },
        }
    }

    /// Delays to wait before each retry, `max_attempts - 1` of them.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        match &self.backoff {
            BackoffStrategy::Constant { delay } => Box::new(
                ConstantBuilder::default()
                    .with_delay(*delay)
                    .with_max_times(retries)
                    .build(),
            ),
            BackoffStrategy::Exponential {
                min_delay,
                max_delay,
                factor,
            } => Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(*min_delay)
                    .with_max_delay(*max_delay)
                    .with_factor(*factor)
                    .with_max_times(retries)
                    .build(),
            ),
        }
    }
}
