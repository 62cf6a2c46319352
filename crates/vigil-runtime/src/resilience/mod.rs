//! Resilience patterns for vigil-runtime.
//!
//! This module provides:
//! - Global rate limiting shared by every outbound request
//! - Retry with backoff for transient failures
//! - A circuit breaker that stops a batch when the service is down
//! - Query statistics

mod circuit_breaker;
mod rate_limit;
mod retry;
mod stats;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use stats::QueryStats;
