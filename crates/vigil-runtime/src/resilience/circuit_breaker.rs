//! Circuit breaker for the literature service.
//!
//! When queries keep failing after their retries are spent, the circuit
//! opens and the batch runner stops instead of burning through the rest
//! of the queue against a dead service.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::duration_str;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive exhausted queries before opening
    pub failure_threshold: u32,

    /// Time before a trial query is let through
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successful trial queries needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of the circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Service considered down, queries are rejected
    Open { opened_at: Duration },

    /// Probing whether the service is back
    HalfOpen { successes: u32 },
}

/// Circuit breaker over a single literature source.
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed { failures: 0 }),
            config,
            clock,
        }
    }

    /// Whether queries should be rejected right now.
    ///
    /// An open circuit whose recovery timeout has passed moves to half-open
    /// and lets the caller through.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.write();
        match *state {
            CircuitState::Open { opened_at } => {
                if self.clock.now().saturating_sub(opened_at) >= self.config.recovery_timeout {
                    *state = CircuitState::HalfOpen { successes: 0 };
                    tracing::info!("Circuit half-open, probing literature service");
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Record a query that got an answer from the service.
    pub fn record_success(&self) {
        let mut state = self.state.write();
        match *state {
            CircuitState::HalfOpen { successes } => {
                if successes + 1 >= self.config.success_threshold {
                    *state = CircuitState::Closed { failures: 0 };
                    tracing::info!("Circuit closed after successful recovery");
                } else {
                    *state = CircuitState::HalfOpen {
                        successes: successes + 1,
                    };
                }
            }
            CircuitState::Closed { .. } => {
                *state = CircuitState::Closed { failures: 0 };
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// Record a query that exhausted its retries on transient failures.
    pub fn record_failure(&self) {
        let mut state = self.state.write();
        match *state {
            CircuitState::Closed { failures } => {
                if failures + 1 >= self.config.failure_threshold {
                    *state = CircuitState::Open {
                        opened_at: self.clock.now(),
                    };
                    tracing::warn!(
                        failures = failures + 1,
                        "Circuit opened after repeated failures"
                    );
                } else {
                    *state = CircuitState::Closed {
                        failures: failures + 1,
                    };
                }
            }
            CircuitState::HalfOpen { .. } => {
                *state = CircuitState::Open {
                    opened_at: self.clock.now(),
                };
                tracing::warn!("Circuit reopened after failed recovery attempt");
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(failure_threshold: u32) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CircuitBreakerConfig {
            failure_threshold,
            ..Default::default()
        };
        (CircuitBreaker::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_circuit_starts_closed() {
        let (cb, _) = breaker(3);
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let (cb, _) = breaker(2);

        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
    }

    #[test]
    fn test_success_resets_failures() {
        let (cb, _) = breaker(3);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[test]
    fn test_recovery_after_timeout() {
        let (cb, clock) = breaker(1);

        cb.record_failure();
        assert!(cb.is_open());

        clock.advance(Duration::from_secs(30));
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::HalfOpen { successes: 0 });

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_failed_trial_reopens() {
        let (cb, clock) = breaker(1);

        cb.record_failure();
        clock.advance(Duration::from_secs(31));
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
    }
}
