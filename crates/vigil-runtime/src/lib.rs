//! # vigil-runtime
//!
//! Literature lookups and batch validation for Vigil.
//!
//! `vigil-core` scores a symptom once it knows the paper count. This crate
//! finds that count: it queries a literature source under a global rate
//! limit, retries transient failures, stops when the service is down, and
//! runs whole batches with checkpointing and cancellation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_core::ObservationBatch;
//! use vigil_runtime::{BatchRunner, FixtureSource, RuntimeConfig};
//!
//! let batch = ObservationBatch::from_path("observations.json")?;
//! let source = Arc::new(FixtureSource::from_file("literature.json")?);
//!
//! let runner = BatchRunner::from_config(&RuntimeConfig::default(), source, None)?;
//! let report = runner.run(batch.observations()).await?;
//! println!("{}: {} validated", report.state, report.validated.len());
//! ```

pub mod batch;
pub mod cache;
pub mod checkpoint;
pub mod client;
pub mod clock;
pub mod config;
pub mod literature;
pub mod resilience;
pub mod validator;

#[cfg(test)]
mod testing;

pub use batch::{BatchError, BatchRunner, BatchRunnerBuilder, CancelHandle};
pub use cache::{CacheConfig, QueryCache};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use client::{LiteratureClient, LiteratureClientBuilder, QueryFailure};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BatchConfig, ConfigError, LiteratureConfig, RuntimeConfig};
pub use literature::{
    ApiCredential, CredentialSource, FixtureSource, LiteratureQuery, LiteratureSource,
    PubmedSource, QueryError, QueryOptions, RequestPacer, SourceFactory, SourceRegistry,
};
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitState, QueryStats,
    RateLimitConfig, RateLimiter, RetryPolicy,
};
pub use validator::{EvidenceValidator, ValidationError};
