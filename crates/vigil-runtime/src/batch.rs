//! Batch runner: validates a queue of observations and produces a
//! [`BatchReport`].
//!
//! ```text
//! PENDING -> RUNNING -> COMPLETED | PARTIALLY_COMPLETED | FAILED
//! ```
//!
//! Per-item failures are collected and the batch moves on. The run stops
//! early only when it is cancelled, when the literature service is
//! declared unavailable, or when a checkpoint cannot be written. Every
//! queued item that was never attempted is listed in
//! [`BatchReport::unprocessed`].

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use vigil_core::{
    BatchReport, BatchState, EmptyBatchPolicy, ErrorKind, ItemError, Observation, RunOutcome,
    Summarizer, ValidationRecord,
};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::client::LiteratureClient;
use crate::clock::Clock;
use crate::config::{BatchConfig, ConfigError, RuntimeConfig};
use crate::literature::LiteratureSource;
use crate::validator::{EvidenceValidator, ValidationError};

/// Errors that end a batch without a normal report.
#[derive(Error, Debug)]
pub enum BatchError {
    /// The checkpoint could not be written. `report` holds everything
    /// validated up to that point.
    #[error("Checkpoint write failed: {source}")]
    Checkpoint {
        source: CheckpointError,
        report: Box<BatchReport>,
    },

    #[error("Cannot resume from checkpoint: {0}")]
    Resume(#[source] CheckpointError),
}

impl BatchError {
    /// Partial report, when the failure left one behind.
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            BatchError::Checkpoint { report, .. } => Some(report),
            BatchError::Resume(_) => None,
        }
    }
}

/// Cooperative cancellation, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop starting new items. An item already querying finishes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one queued item.
enum ItemOutcome {
    Done(Result<ValidationRecord, ValidationError>),
    Cancelled,
    Skipped,
}

/// Mutable state of one run.
struct BatchRun<'a> {
    observations: &'a [Observation],
    records: Vec<Option<ValidationRecord>>,
    failed: Vec<bool>,
    errors: Vec<ItemError>,
    resumed: usize,
    cancelled: bool,
    aborted: Option<String>,
}

impl<'a> BatchRun<'a> {
    fn new(observations: &'a [Observation]) -> Self {
        Self {
            observations,
            records: vec![None; observations.len()],
            failed: vec![false; observations.len()],
            errors: Vec::new(),
            resumed: 0,
            cancelled: false,
            aborted: None,
        }
    }

    fn restore(&mut self, index: usize, record: ValidationRecord) {
        self.records[index] = Some(record);
        self.resumed += 1;
    }

    fn succeed(&mut self, index: usize, record: ValidationRecord) {
        self.records[index] = Some(record);
    }

    fn fail(&mut self, index: usize, error: &ValidationError) {
        self.failed[index] = true;
        self.errors.push(ItemError {
            symptom: self.observations[index].symptom().to_string(),
            error_kind: error.kind(),
            message: error.to_string(),
            attempts: error.attempts(),
        });
    }

    fn records(&self) -> Vec<ValidationRecord> {
        self.records.iter().flatten().cloned().collect()
    }

    fn into_report(
        self,
        empty_policy: EmptyBatchPolicy,
        started_at: DateTime<Utc>,
    ) -> BatchReport {
        let unprocessed = self
            .observations
            .iter()
            .enumerate()
            .filter(|(i, _)| self.records[*i].is_none() && !self.failed[*i])
            .map(|(_, obs)| obs.symptom().to_string())
            .collect();
        let validated: Vec<ValidationRecord> = self.records.into_iter().flatten().collect();

        let outcome = RunOutcome {
            succeeded: validated.len(),
            failed: self.errors.len(),
            cancelled: self.cancelled,
            aborted: self.aborted.is_some(),
            empty_policy,
        };
        let summary = Summarizer::new().summarize(&validated, self.errors.len());

        BatchReport {
            state: outcome.resolve(),
            validated,
            errors: self.errors,
            summary,
            resumed: self.resumed,
            cancelled: self.cancelled,
            aborted: self.aborted,
            unprocessed,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Runs validation batches.
///
/// A runner can be reused; each [`BatchRunner::run`] starts from
/// `PENDING`.
pub struct BatchRunner {
    validator: Arc<EvidenceValidator>,
    concurrency: usize,
    empty_policy: EmptyBatchPolicy,
    checkpoint: Option<CheckpointStore>,
    cancel: CancelHandle,
    state: watch::Sender<BatchState>,
}

impl BatchRunner {
    pub fn builder(validator: Arc<EvidenceValidator>) -> BatchRunnerBuilder {
        BatchRunnerBuilder::new(validator)
    }

    /// Wire a runner from configuration: client, validator and runner.
    pub fn from_config(
        config: &RuntimeConfig,
        source: Arc<dyn LiteratureSource>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut client = LiteratureClient::builder(source).config(config);
        if let Some(clock) = clock {
            client = client.clock(clock);
        }
        let validator = EvidenceValidator::new(Arc::new(client.build()), config.scorer()?);

        Ok(Self::builder(Arc::new(validator))
            .config(&config.batch)
            .build())
    }

    /// Handle that stops the run between items.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> BatchState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state.subscribe()
    }

    pub fn validator(&self) -> &EvidenceValidator {
        &self.validator
    }

    /// Validate `observations` in order.
    ///
    /// Returns `Err` only for checkpoint problems; every other failure is
    /// recorded in the report.
    pub async fn run(&self, observations: &[Observation]) -> Result<BatchReport, BatchError> {
        let started_at = Utc::now();
        self.state.send_replace(BatchState::Pending);

        let restored: HashMap<String, ValidationRecord> = match &self.checkpoint {
            Some(store) => store
                .restore(self.validator.scorer())
                .map_err(BatchError::Resume)?,
            None => HashMap::new(),
        };

        let mut run = BatchRun::new(observations);
        let mut queue = Vec::with_capacity(observations.len());
        for (index, observation) in observations.iter().enumerate() {
            match restored.get(observation.symptom()) {
                Some(record) if matches_observation(record, observation) => {
                    run.restore(index, record.clone());
                }
                Some(_) => {
                    tracing::debug!(
                        symptom = observation.symptom(),
                        "Checkpoint record is stale, re-validating"
                    );
                    queue.push((index, observation));
                }
                None => queue.push((index, observation)),
            }
        }

        if observations.is_empty() && self.empty_policy == EmptyBatchPolicy::Error {
            tracing::warn!("Empty batch under the error policy");
        }

        let client = self.validator.client();
        tracing::info!(
            source = client.source_name(),
            max_papers = client.options().max_papers,
            total = observations.len(),
            queued = queue.len(),
            resumed = run.resumed,
            concurrency = self.concurrency,
            "Starting validation batch"
        );
        self.state.send_replace(BatchState::Running);

        let abort = AtomicBool::new(false);
        let mut outcomes = stream::iter(queue.iter().map(|&(index, observation)| {
            let abort = &abort;
            async move {
                if self.cancel.is_cancelled() {
                    return (index, ItemOutcome::Cancelled);
                }
                if abort.load(Ordering::SeqCst) {
                    return (index, ItemOutcome::Skipped);
                }
                let result = self.validator.validate(observation).await;
                (index, ItemOutcome::Done(result))
            }
        }))
        .buffered(self.concurrency);

        while let Some((index, outcome)) = outcomes.next().await {
            match outcome {
                ItemOutcome::Done(Ok(record)) => {
                    run.succeed(index, record);
                    if let Some(store) = &self.checkpoint {
                        if let Err(source) = store.save(&run.records()) {
                            tracing::error!(error = %source, "Checkpoint write failed, stopping batch");
                            run.aborted = Some(format!("checkpoint write failed: {}", source));
                            let report = self.finish(run, started_at);
                            return Err(BatchError::Checkpoint {
                                source,
                                report: Box::new(report),
                            });
                        }
                    }
                }
                ItemOutcome::Done(Err(error)) if error.kind() == ErrorKind::ServiceUnavailable => {
                    if !abort.swap(true, Ordering::SeqCst) {
                        tracing::error!(
                            symptom = error.symptom(),
                            "Literature service unavailable, aborting batch"
                        );
                        run.aborted = Some(error.to_string());
                    }
                }
                ItemOutcome::Done(Err(error)) => {
                    tracing::warn!(
                        symptom = error.symptom(),
                        kind = %error.kind(),
                        error = %error,
                        "Item failed"
                    );
                    run.fail(index, &error);
                }
                ItemOutcome::Cancelled => {
                    if !run.cancelled {
                        tracing::info!("Batch cancelled, skipping remaining items");
                    }
                    run.cancelled = true;
                }
                ItemOutcome::Skipped => {}
            }
        }
        drop(outcomes);

        Ok(self.finish(run, started_at))
    }

    fn finish(&self, run: BatchRun<'_>, started_at: DateTime<Utc>) -> BatchReport {
        let report = run.into_report(self.empty_policy, started_at);
        self.state.send_replace(report.state);

        let stats = self.validator.client().stats();
        tracing::info!(
            state = %report.state,
            validated = report.validated.len(),
            failed = report.errors.len(),
            unprocessed = report.unprocessed.len(),
            resumed = report.resumed,
            attempts = stats.attempts,
            retries = stats.retries,
            cache_hits = stats.cache_hits,
            "Validation batch finished"
        );
        report
    }
}

/// A checkpointed record still describes this observation.
fn matches_observation(record: &ValidationRecord, observation: &Observation) -> bool {
    record.reddit_data.mention_count == observation.mention_count()
        && record.reddit_data.post_count == observation.post_count()
        && record.reddit_data.frequency == observation.frequency()
}

/// Builder for [`BatchRunner`].
pub struct BatchRunnerBuilder {
    validator: Arc<EvidenceValidator>,
    concurrency: usize,
    empty_policy: EmptyBatchPolicy,
    checkpoint_path: Option<PathBuf>,
    cancel: CancelHandle,
}

impl BatchRunnerBuilder {
    pub fn new(validator: Arc<EvidenceValidator>) -> Self {
        Self {
            validator,
            concurrency: 1,
            empty_policy: EmptyBatchPolicy::default(),
            checkpoint_path: None,
            cancel: CancelHandle::new(),
        }
    }

    pub fn config(mut self, config: &BatchConfig) -> Self {
        self.concurrency = config.concurrency;
        self.empty_policy = config.empty_batch;
        self.checkpoint_path = config.checkpoint_path.clone();
        self
    }

    /// Items in flight at once; zero is treated as one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn empty_policy(mut self, policy: EmptyBatchPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Share a cancel handle created elsewhere.
    pub fn cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> BatchRunner {
        let (state, _) = watch::channel(BatchState::Pending);
        BatchRunner {
            validator: self.validator,
            concurrency: self.concurrency.max(1),
            empty_policy: self.empty_policy,
            checkpoint: self.checkpoint_path.map(CheckpointStore::new),
            cancel: self.cancel,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::clock::ManualClock;
    use crate::literature::{LiteratureQuery, QueryError, RequestPacer};
    use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};
    use crate::testing::{bad_request, server_error, ScriptedSource};
    use async_trait::async_trait;
    use std::time::Duration;
    use vigil_core::{LiteratureResult, Scorer};

    const SYMPTOMS: [&str; 5] = ["nausea", "fatigue", "hair loss", "sulfur burps", "brain fog"];

    fn observations() -> Vec<Observation> {
        SYMPTOMS
            .iter()
            .enumerate()
            .map(|(i, s)| Observation::new(s, 100, 80 - i as u64 * 10, 0.08 - i as f64 * 0.01).unwrap())
            .collect()
    }

    fn all_found() -> ScriptedSource {
        ScriptedSource::new()
            .papers("nausea", 412)
            .papers("fatigue", 35)
            .papers("hair loss", 3)
            .papers("sulfur burps", 0)
            .papers("brain fog", 1)
    }

    fn validator(source: Arc<dyn LiteratureSource>, clock: Arc<ManualClock>) -> Arc<EvidenceValidator> {
        let client = LiteratureClient::builder(source)
            .rate_limit(RateLimitConfig {
                requests_per_minute: 60,
            })
            .retry(RetryPolicy::constant(2, Duration::from_millis(100)))
            .circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            })
            .cache(CacheConfig {
                enabled: false,
                ..Default::default()
            })
            .clock(clock)
            .build();
        Arc::new(EvidenceValidator::new(Arc::new(client), Scorer::default()))
    }

    fn runner(source: Arc<dyn LiteratureSource>) -> BatchRunnerBuilder {
        BatchRunner::builder(validator(source, Arc::new(ManualClock::new())))
    }

    fn symptoms(records: &[ValidationRecord]) -> Vec<&str> {
        records.iter().map(|r| r.symptom.as_str()).collect()
    }

    #[tokio::test]
    async fn test_all_succeed_is_completed() {
        let runner = runner(Arc::new(all_found())).build();
        let report = runner.run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(symptoms(&report.validated), SYMPTOMS.to_vec());
        assert!(report.errors.is_empty());
        assert!(report.unprocessed.is_empty());
        assert_eq!(report.summary.total_validated, 5);
        assert_eq!(runner.state(), BatchState::Completed);
    }

    #[tokio::test]
    async fn test_third_item_permanent_failure_is_partial() {
        let source = all_found().script("hair loss", vec![Err(bad_request())]);
        let report = runner(Arc::new(source)).build().run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::PartiallyCompleted);
        assert_eq!(
            symptoms(&report.validated),
            vec!["nausea", "fatigue", "sulfur burps", "brain fog"]
        );
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].symptom, "hair loss");
        assert_eq!(report.errors[0].error_kind, ErrorKind::PermanentQueryFailure);
        assert_eq!(report.errors[0].attempts, 1);
        assert_eq!(report.summary.total_failed, 1);
        assert!(report.unprocessed.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_succeeds_is_failed() {
        let report = runner(Arc::new(ScriptedSource::new()))
            .build()
            .run(&observations())
            .await
            .unwrap();

        assert_eq!(report.state, BatchState::Failed);
        assert_eq!(report.errors.len(), 5);
        assert!(report.validated.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_policies() {
        let report = runner(Arc::new(all_found())).build().run(&[]).await.unwrap();
        assert_eq!(report.state, BatchState::Completed);

        let report = runner(Arc::new(all_found()))
            .empty_policy(EmptyBatchPolicy::Error)
            .build()
            .run(&[])
            .await
            .unwrap();
        assert_eq!(report.state, BatchState::Failed);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let runner = runner(Arc::new(all_found())).build();
        let first = runner.run(&observations()).await.unwrap();
        let second = runner.run(&observations()).await.unwrap();

        assert_eq!(first.validated, second.validated);
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.state, second.state);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let runner = runner(Arc::new(all_found())).build();
        runner.cancel_handle().cancel();

        let report = runner.run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::PartiallyCompleted);
        assert!(report.cancelled);
        assert!(report.validated.is_empty());
        assert_eq!(report.unprocessed.len(), 5);
    }

    /// Cancels the batch while answering one symptom.
    struct CancelOn {
        inner: ScriptedSource,
        symptom: &'static str,
        handle: CancelHandle,
    }

    #[async_trait]
    impl LiteratureSource for CancelOn {
        async fn search(
            &self,
            query: &LiteratureQuery,
            pacer: &RequestPacer<'_>,
        ) -> Result<LiteratureResult, QueryError> {
            if query.symptom == self.symptom {
                self.handle.cancel();
            }
            self.inner.search(query, pacer).await
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "cancel-on"
        }
    }

    #[tokio::test]
    async fn test_cancel_between_items_keeps_in_flight_result() {
        let handle = CancelHandle::new();
        let source = CancelOn {
            inner: all_found(),
            symptom: "fatigue",
            handle: handle.clone(),
        };
        let runner = runner(Arc::new(source)).cancel_handle(handle).build();

        let report = runner.run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::PartiallyCompleted);
        assert!(report.cancelled);
        assert_eq!(symptoms(&report.validated), vec!["nausea", "fatigue"]);
        assert_eq!(report.unprocessed, vec!["hair loss", "sulfur burps", "brain fog"]);
    }

    #[tokio::test]
    async fn test_cancel_after_failure_is_partial_not_failed() {
        let handle = CancelHandle::new();
        let source = CancelOn {
            inner: ScriptedSource::new().script("nausea", vec![Err(bad_request())]),
            symptom: "nausea",
            handle: handle.clone(),
        };
        let runner = runner(Arc::new(source)).cancel_handle(handle).build();

        let report = runner.run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::PartiallyCompleted);
        assert!(report.cancelled);
        assert!(report.validated.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].symptom, "nausea");
        assert_eq!(report.unprocessed.len(), 4);
    }

    #[tokio::test]
    async fn test_open_circuit_aborts_batch() {
        let source = all_found().script("fatigue", vec![Err(server_error())]);
        let report = runner(Arc::new(source)).build().run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::PartiallyCompleted);
        assert_eq!(symptoms(&report.validated), vec!["nausea"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].error_kind, ErrorKind::TransientQueryFailure);
        assert_eq!(report.errors[0].attempts, 2);
        assert!(report.aborted.is_some());
        assert_eq!(report.unprocessed, vec!["hair loss", "sulfur burps", "brain fog"]);
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");

        let flaky = all_found().script("sulfur burps", vec![Err(bad_request())]);
        let first = runner(Arc::new(flaky))
            .checkpoint(&path)
            .build()
            .run(&observations())
            .await
            .unwrap();
        assert_eq!(first.state, BatchState::PartiallyCompleted);
        assert_eq!(first.validated.len(), 4);

        let source = Arc::new(all_found());
        let second = runner(source.clone())
            .checkpoint(&path)
            .build()
            .run(&observations())
            .await
            .unwrap();

        assert_eq!(second.state, BatchState::Completed);
        assert_eq!(second.resumed, 4);
        assert_eq!(symptoms(&second.validated), SYMPTOMS.to_vec());
        assert_eq!(source.calls(), vec!["sulfur burps"]);
    }

    #[tokio::test]
    async fn test_stale_checkpoint_record_is_revalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        let obs = vec![Observation::new("nausea", 10, 5, 0.05).unwrap()];

        runner(Arc::new(all_found()))
            .checkpoint(&path)
            .build()
            .run(&obs)
            .await
            .unwrap();

        let changed = vec![Observation::new("nausea", 20, 9, 0.09).unwrap()];
        let source = Arc::new(all_found());
        let report = runner(source.clone())
            .checkpoint(&path)
            .build()
            .run(&changed)
            .await
            .unwrap();

        assert_eq!(report.resumed, 0);
        assert_eq!(report.validated[0].reddit_data.post_count, 9);
        assert_eq!(source.calls_for("nausea"), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_returns_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("batch.json");

        let err = runner(Arc::new(all_found()))
            .checkpoint(path)
            .build()
            .run(&observations())
            .await
            .unwrap_err();

        let report = err.report().unwrap();
        assert!(matches!(err, BatchError::Checkpoint { .. }));
        assert_eq!(symptoms(&report.validated), vec!["nausea"]);
        assert_eq!(report.unprocessed.len(), 4);
        assert_eq!(report.state, BatchState::PartiallyCompleted);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_stops_before_querying() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, "not json").unwrap();

        let source = Arc::new(all_found());
        let result = runner(source.clone())
            .checkpoint(&path)
            .build()
            .run(&observations())
            .await;

        assert!(matches!(result, Err(BatchError::Resume(_))));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_run_keeps_order_and_rate() {
        let clock = Arc::new(ManualClock::new());
        let runner = BatchRunner::builder(validator(Arc::new(all_found()), clock.clone()))
            .concurrency(3)
            .build();

        let report = runner.run(&observations()).await.unwrap();

        assert_eq!(symptoms(&report.validated), SYMPTOMS.to_vec());
        assert!(clock.now() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_sequential_run_respects_rate_limit() {
        let clock = Arc::new(ManualClock::new());
        let runner = BatchRunner::builder(validator(Arc::new(all_found()), clock.clone())).build();

        runner.run(&observations()).await.unwrap();
        assert!(clock.now() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_state_watch_reaches_terminal() {
        let runner = runner(Arc::new(all_found())).build();
        let mut rx = runner.subscribe();
        assert_eq!(*rx.borrow_and_update(), BatchState::Pending);

        runner.run(&observations()).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_terminal());
    }

    #[tokio::test]
    async fn test_from_config_wires_runner() {
        let mut config = RuntimeConfig::default();
        config.batch.concurrency = 2;
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());

        let runner = BatchRunner::from_config(&config, Arc::new(all_found()), Some(clock)).unwrap();
        let report = runner.run(&observations()).await.unwrap();

        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(runner.validator().client().stats().attempts, 5);
    }
}
