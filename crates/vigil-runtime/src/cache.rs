//! In-process cache of literature results.
//!
//! Re-running a batch, or two symptoms that normalize to the same query,
//! should not spend request budget twice. Only successful results are
//! cached; failures are always retried on the next run.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_core::LiteratureResult;

use crate::config::duration_str;

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Literature result cache using moka, keyed by
/// [`crate::literature::LiteratureQuery::cache_key`].
pub struct QueryCache {
    cache: Cache<String, LiteratureResult>,
}

impl QueryCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &str) -> Option<LiteratureResult> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, result: LiteratureResult) {
        self.cache.insert(key, result).await;
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::new(config.max_entries, config.ttl)
    }
}
