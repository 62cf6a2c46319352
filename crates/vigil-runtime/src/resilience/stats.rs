//! Counters for literature queries made during a run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accumulated query statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Queries requested by callers, cache hits included
    pub queries: u32,

    /// Attempts made against the source
    pub attempts: u32,

    /// Outbound requests; one attempt may send several
    pub requests: u32,

    pub retries: u32,
    pub cache_hits: u32,
    pub succeeded: u32,

    /// Queries that exhausted their retries
    pub transient_failures: u32,

    pub permanent_failures: u32,

    /// Queries rejected because the circuit was open
    pub rejected: u32,

    /// Time spent waiting on the rate limiter and backoff
    #[serde(with = "crate::config::duration_str")]
    pub total_wait: Duration,
}

impl QueryStats {
    /// Fraction of queries answered from the cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.queries == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / self.queries as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_rate() {
        let stats = QueryStats {
            queries: 4,
            cache_hits: 1,
            ..Default::default()
        };
        assert!((stats.cache_hit_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(QueryStats::default().cache_hit_rate(), 0.0);
    }
}
