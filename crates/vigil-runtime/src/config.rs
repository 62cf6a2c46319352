//! Runtime configuration.
//!
//! Loaded from YAML with a default for every field, then overridden from
//! the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `VIGIL_CONTACT_EMAIL` | `literature.contact_email` |
//! | `NCBI_API_KEY` | `literature.api_key` |
//! | `VIGIL_REQUESTS_PER_MINUTE` | `rate_limit.requests_per_minute` |
//! | `VIGIL_MAX_ATTEMPTS` | `retry.max_attempts` |
//!
//! Durations are written as humantime strings (`"500ms"`, `"30s"`) or as
//! whole seconds.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vigil_core::{EmptyBatchPolicy, InclusionFilter, Scorer, ScoringConfig, ScoringError};

use crate::cache::CacheConfig;
use crate::literature::{
    LiteratureSource, QueryError, QueryOptions, SourceRegistry,
};
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

pub const CONTACT_EMAIL_ENV: &str = "VIGIL_CONTACT_EMAIL";
pub const API_KEY_ENV: &str = "NCBI_API_KEY";
pub const REQUESTS_PER_MINUTE_ENV: &str = "VIGIL_REQUESTS_PER_MINUTE";
pub const MAX_ATTEMPTS_ENV: &str = "VIGIL_MAX_ATTEMPTS";

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid scoring configuration: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Literature source: {0}")]
    Source(#[from] QueryError),
}

/// Serde helpers for durations as humantime strings.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Literature source selection and query shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiteratureConfig {
    /// Registered source type: `pubmed` or `fixture`
    pub source: String,

    pub base_url: Option<String>,
    pub tool: Option<String>,
    pub contact_email: Option<String>,

    /// Redacted in `Debug` and never serialized back out
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,

    /// Results file for the `fixture` source
    pub fixture_path: Option<PathBuf>,

    pub max_papers: usize,
    pub context_terms: Vec<String>,

    /// Per-request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            source: "pubmed".to_string(),
            base_url: None,
            tool: None,
            contact_email: None,
            api_key: None,
            fixture_path: None,
            max_papers: 5,
            context_terms: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl LiteratureConfig {
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            context_terms: self.context_terms.clone(),
            max_papers: self.max_papers,
        }
    }

    /// JSON handed to the source factory, without the API key.
    pub fn source_config(&self) -> JsonValue {
        let mut config = serde_json::Map::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                config.insert(key.to_string(), JsonValue::String(value));
            }
        };
        set("base_url", self.base_url.clone());
        set("tool", self.tool.clone());
        set("contact_email", self.contact_email.clone());
        set(
            "path",
            self.fixture_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        );
        JsonValue::Object(config)
    }
}

/// Batch runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Observations below either threshold never enter the queue
    #[serde(flatten)]
    pub inclusion: InclusionFilter,

    /// Items in flight at once; the rate limit is shared either way
    pub concurrency: usize,

    pub checkpoint_path: Option<PathBuf>,
    pub empty_batch: EmptyBatchPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inclusion: InclusionFilter::default(),
            concurrency: 1,
            checkpoint_path: None,
            empty_batch: EmptyBatchPolicy::default(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub literature: LiteratureConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub scoring: ScoringConfig,
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(email) = get(CONTACT_EMAIL_ENV) {
            self.literature.contact_email = Some(email);
        }
        if let Some(key) = get(API_KEY_ENV) {
            self.literature.api_key = Some(SecretString::from(key));
        }
        if let Some(rpm) = get(REQUESTS_PER_MINUTE_ENV) {
            self.rate_limit.requests_per_minute = parse_env(REQUESTS_PER_MINUTE_ENV, &rpm)?;
        }
        if let Some(attempts) = get(MAX_ATTEMPTS_ENV) {
            self.retry.max_attempts = parse_env(MAX_ATTEMPTS_ENV, &attempts)?;
        }
        Ok(())
    }

    /// Reject settings that cannot produce a working run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.literature.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "literature.timeout must be non-zero".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.batch.inclusion.min_frequency) {
            return Err(ConfigError::Invalid(
                "batch.min_frequency must be in [0, 1]".to_string(),
            ));
        }
        Scorer::new(self.scoring.clone())?;
        Ok(())
    }

    pub fn scorer(&self) -> Result<Scorer, ConfigError> {
        Ok(Scorer::new(self.scoring.clone())?)
    }

    /// Create the configured literature source from `registry`.
    pub fn create_source(
        &self,
        registry: &SourceRegistry,
    ) -> Result<Arc<dyn LiteratureSource>, ConfigError> {
        let mut config = self.literature.source_config();
        if let Some(key) = &self.literature.api_key {
            // Exposed only for the factory, which wraps it again
            config["api_key"] = JsonValue::String(key.expose_secret().to_string());
        }
        Ok(registry.create(&self.literature.source, &config)?)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{}='{}': {}", key, value, e)))
}
