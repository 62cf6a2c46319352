//! Literature client: one place where queries are paced, retried, timed
//! out, cached and cut off when the service is down.
//!
//! ```text
//! query(symptom)
//!   -> build LiteratureQuery (permanent failure if nothing searchable)
//!   -> cache hit? return it
//!   -> circuit open? CircuitOpen
//!   -> loop: search, each request paced and timed out
//!        ok        -> record success, cache, return
//!        transient -> back off and retry while attempts remain
//!        permanent -> return
//! ```

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vigil_core::{ErrorKind, LiteratureResult};

use crate::cache::{CacheConfig, QueryCache};
use crate::clock::{Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::literature::{
    LiteratureQuery, LiteratureSource, QueryError, QueryOptions, RequestPacer,
};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, QueryStats, RateLimitConfig, RateLimiter, RetryPolicy,
};

/// A query that failed, with the number of requests it took.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct QueryFailure {
    pub error: QueryError,

    /// Requests sent; zero when the query was rejected before sending
    pub attempts: u32,
}

impl QueryFailure {
    pub fn new(error: QueryError, attempts: u32) -> Self {
        Self { error, attempts }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Resilient wrapper around a [`LiteratureSource`].
pub struct LiteratureClient {
    source: Arc<dyn LiteratureSource>,
    options: QueryOptions,
    timeout: Duration,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    circuit_breaker: CircuitBreaker,
    cache: Option<QueryCache>,
    clock: Arc<dyn Clock>,
    stats: RwLock<QueryStats>,
}

impl LiteratureClient {
    pub fn builder(source: Arc<dyn LiteratureSource>) -> LiteratureClientBuilder {
        LiteratureClientBuilder::new(source)
    }

    /// Paper count and top papers for one symptom.
    #[tracing::instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn query(&self, symptom: &str) -> Result<LiteratureResult, QueryFailure> {
        self.stats.write().queries += 1;

        let query = LiteratureQuery::new(symptom, &self.options).map_err(|e| {
            self.stats.write().permanent_failures += 1;
            QueryFailure::new(e, 0)
        })?;
        let key = query.cache_key();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!("Literature cache hit");
                let mut stats = self.stats.write();
                stats.cache_hits += 1;
                stats.succeeded += 1;
                return Ok(hit);
            }
        }

        if self.circuit_breaker.is_open() {
            self.stats.write().rejected += 1;
            return Err(QueryFailure::new(QueryError::CircuitOpen, 0));
        }

        let mut delays = self.retry.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let pacer = RequestPacer::new(&self.rate_limiter, self.timeout);
            let outcome = self.source.search(&query, &pacer).await;
            {
                let mut stats = self.stats.write();
                stats.attempts += 1;
                stats.requests += pacer.requests();
                stats.total_wait += pacer.waited();
            }

            match outcome {
                Ok(result) => {
                    let result = result.truncated(self.options.max_papers);
                    self.circuit_breaker.record_success();
                    self.stats.write().succeeded += 1;
                    if let Some(cache) = &self.cache {
                        cache.insert(key, result.clone()).await;
                    }
                    tracing::debug!(attempt, paper_count = result.paper_count, "Literature query succeeded");
                    return Ok(result);
                }
                Err(error) if error.is_transient() => match delays.next() {
                    Some(backoff) => {
                        let delay = error.retry_after().map_or(backoff, |ra| ra.max(backoff));
                        tracing::warn!(attempt, delay = ?delay, error = %error, "Transient literature failure, retrying");
                        {
                            let mut stats = self.stats.write();
                            stats.retries += 1;
                            stats.total_wait += delay;
                        }
                        self.clock.sleep(delay).await;
                    }
                    None => {
                        tracing::warn!(attempt, error = %error, "Literature query failed after retries");
                        self.circuit_breaker.record_failure();
                        self.stats.write().transient_failures += 1;
                        return Err(QueryFailure::new(error, attempt));
                    }
                },
                Err(error) => {
                    tracing::warn!(attempt, error = %error, "Literature query rejected");
                    self.stats.write().permanent_failures += 1;
                    return Err(QueryFailure::new(error, attempt));
                }
            }
        }
    }

    /// Snapshot of the counters so far.
    pub fn stats(&self) -> QueryStats {
        self.stats.read().clone()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

/// Builder for [`LiteratureClient`].
pub struct LiteratureClientBuilder {
    source: Arc<dyn LiteratureSource>,
    options: QueryOptions,
    timeout: Duration,
    rate_limit: RateLimitConfig,
    retry: RetryPolicy,
    circuit_breaker: CircuitBreakerConfig,
    cache: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl LiteratureClientBuilder {
    pub fn new(source: Arc<dyn LiteratureSource>) -> Self {
        Self {
            source,
            options: QueryOptions::default(),
            timeout: Duration::from_secs(30),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            clock: None,
        }
    }

    /// Take every client setting from a runtime config.
    pub fn config(mut self, config: &RuntimeConfig) -> Self {
        self.options = config.literature.query_options();
        self.timeout = config.literature.timeout;
        self.rate_limit = config.rate_limit.clone();
        self.retry = config.retry.clone();
        self.circuit_breaker = config.circuit_breaker.clone();
        self.cache = config.cache.clone();
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> LiteratureClient {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);

        LiteratureClient {
            source: self.source,
            options: self.options,
            timeout: self.timeout,
            rate_limiter: RateLimiter::from_config(&self.rate_limit, clock.clone()),
            retry: self.retry,
            circuit_breaker: CircuitBreaker::new(self.circuit_breaker, clock.clone()),
            cache: QueryCache::from_config(&self.cache),
            clock,
            stats: RwLock::new(QueryStats::default()),
        }
    }
}
