//! Literature source abstractions for vigil-runtime.
//!
//! A [`LiteratureSource`] answers one question: how many papers document
//! this symptom, and which are the top few. Sources never retry or cache;
//! [`crate::client::LiteratureClient`] wraps them with that. Pacing is
//! per request: a source sends every outbound request through the
//! [`RequestPacer`] it is handed, however many requests one query takes.
//!
//! ## Security
//!
//! Sources that need an API key load it through [`secrets`], so the key
//! never shows up in `Debug` output or logs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use vigil_core::{ErrorKind, LiteratureResult};

use crate::resilience::RateLimiter;

mod factory;
mod fixture;
mod pubmed;
mod query;
pub mod secrets;

pub use factory::{SourceFactory, SourceRegistry};
pub use fixture::{FixtureSource, FixtureSourceFactory};
pub use pubmed::{PubmedSource, PubmedSourceFactory};
pub use query::{LiteratureQuery, QueryOptions};
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from literature sources.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("No literature entry for '{0}'")]
    NotFound(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),

    #[error("Literature service unavailable: circuit open")]
    CircuitOpen,
}

impl QueryError {
    /// Whether another attempt could succeed.
    ///
    /// Network trouble, throttling, server errors, timeouts and garbled
    /// responses are transient. Client errors and bad queries are not.
    pub fn is_transient(&self) -> bool {
        match self {
            QueryError::HttpError(_)
            | QueryError::RateLimited { .. }
            | QueryError::ParseError(_)
            | QueryError::Timeout(_) => true,
            QueryError::ApiError { status, .. } => *status >= 500,
            QueryError::MalformedQuery(_)
            | QueryError::NotFound(_)
            | QueryError::NotConfigured(_)
            | QueryError::CircuitOpen => false,
        }
    }

    /// Server-requested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            QueryError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Report classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::CircuitOpen => ErrorKind::ServiceUnavailable,
            e if e.is_transient() => ErrorKind::TransientQueryFailure,
            _ => ErrorKind::PermanentQueryFailure,
        }
    }
}

/// Gate for the outbound requests of one query attempt.
///
/// Every [`RequestPacer::send`] reserves its own slot on the shared
/// [`RateLimiter`] and is bounded by the request timeout.
pub struct RequestPacer<'a> {
    limiter: &'a RateLimiter,
    timeout: Duration,
    requests: AtomicU32,
    waited: Mutex<Duration>,
}

impl<'a> RequestPacer<'a> {
    pub fn new(limiter: &'a RateLimiter, timeout: Duration) -> Self {
        Self {
            limiter,
            timeout,
            requests: AtomicU32::new(0),
            waited: Mutex::new(Duration::ZERO),
        }
    }

    /// Wait for a rate limit slot, then drive `request` under the timeout.
    ///
    /// `request` must not have been polled yet; nothing may go out before
    /// the slot is granted.
    pub async fn send<T, F>(&self, request: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        let waited = self.limiter.acquire().await;
        *self.waited.lock() += waited;
        self.requests.fetch_add(1, Ordering::SeqCst);

        match tokio::time::timeout(self.timeout, request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueryError::Timeout(self.timeout)),
        }
    }

    /// Requests sent through this pacer.
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Time spent waiting for slots.
    pub fn waited(&self) -> Duration {
        *self.waited.lock()
    }
}

/// A backend that can count and list papers for a symptom.
///
/// This is the only place the runtime talks to the outside world.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Run one query. Implementations make a single attempt and send each
    /// outbound request through `pacer`.
    async fn search(
        &self,
        query: &LiteratureQuery,
        pacer: &RequestPacer<'_>,
    ) -> Result<LiteratureResult, QueryError>;

    /// Check if the source is reachable.
    async fn health_check(&self) -> bool;

    /// Source name for logs.
    fn name(&self) -> &str;
}
