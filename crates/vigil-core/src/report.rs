//! Batch report: the output handed to downstream consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::record::ValidationRecord;
use crate::summary::{rank_by_surprise, BatchSummary, Summarizer};

/// Lifecycle of a validation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    /// Queue populated, no queries issued
    Pending,
    Running,
    /// Every queued item succeeded
    Completed,
    /// Some items succeeded and some failed, or the run stopped early
    PartiallyCompleted,
    /// Nothing succeeded
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::PartiallyCompleted | BatchState::Failed
        )
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Pending => "PENDING",
            BatchState::Running => "RUNNING",
            BatchState::Completed => "COMPLETED",
            BatchState::PartiallyCompleted => "PARTIALLY_COMPLETED",
            BatchState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// What an empty queue resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyBatchPolicy {
    /// An empty batch completes with no records
    #[default]
    NoOp,

    /// An empty batch is a failure
    Error,
}

/// Tallies a finished run resolves its terminal state from.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOutcome {
    /// Records produced, including those restored from a checkpoint
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub aborted: bool,
    pub empty_policy: EmptyBatchPolicy,
}

impl RunOutcome {
    /// Resolve the terminal state.
    ///
    /// Rules, in order:
    /// 1. The run was cancelled → PARTIALLY_COMPLETED, whatever else
    ///    happened before the cancel
    /// 2. Nothing succeeded and something failed or the run aborted → FAILED
    /// 3. Nothing at all happened → COMPLETED, or FAILED under
    ///    [`EmptyBatchPolicy::Error`]
    /// 4. Something succeeded alongside failures or an abort →
    ///    PARTIALLY_COMPLETED
    /// 5. Otherwise → COMPLETED
    pub fn resolve(&self) -> BatchState {
        if self.cancelled {
            return BatchState::PartiallyCompleted;
        }

        if self.succeeded == 0 {
            if self.failed > 0 || self.aborted {
                return BatchState::Failed;
            }
            return match self.empty_policy {
                EmptyBatchPolicy::NoOp => BatchState::Completed,
                EmptyBatchPolicy::Error => BatchState::Failed,
            };
        }

        if self.failed > 0 || self.aborted {
            BatchState::PartiallyCompleted
        } else {
            BatchState::Completed
        }
    }
}

/// Classification of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, never retried
    InvalidObservation,

    /// Retryable failure that exhausted its retries
    TransientQueryFailure,

    /// Non-retryable query failure
    PermanentQueryFailure,

    /// The literature service was unreachable and the batch stopped
    ServiceUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidObservation => "invalid_observation",
            ErrorKind::TransientQueryFailure => "transient_query_failure",
            ErrorKind::PermanentQueryFailure => "permanent_query_failure",
            ErrorKind::ServiceUnavailable => "service_unavailable",
        };
        f.write_str(s)
    }
}

/// One failed item in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub symptom: String,
    pub error_kind: ErrorKind,
    pub message: String,

    /// Query attempts made before giving up (0 when no query was sent)
    #[serde(default)]
    pub attempts: u32,
}

/// Final output of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub state: BatchState,

    /// Records in input order
    pub validated: Vec<ValidationRecord>,

    pub errors: Vec<ItemError>,
    pub summary: BatchSummary,

    /// Records restored from a checkpoint rather than queried this run
    #[serde(default)]
    pub resumed: usize,

    #[serde(default)]
    pub cancelled: bool,

    /// Reason the batch stopped early, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,

    /// Symptoms that were queued but never attempted
    #[serde(default)]
    pub unprocessed: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Records by descending surprise score.
    pub fn ranked(&self) -> Vec<&ValidationRecord> {
        rank_by_surprise(&self.validated)
    }

    /// Names of every symptom that needs a re-run: failures first, then
    /// unprocessed items.
    pub fn rerun_symptoms(&self) -> Vec<&str> {
        self.errors
            .iter()
            .map(|e| e.symptom.as_str())
            .chain(self.unprocessed.iter().map(String::as_str))
            .collect()
    }

    /// Recompute the summary from the records, e.g. after a threshold change.
    pub fn resummarize(&mut self) {
        self.summary = Summarizer::new().summarize(&self.validated, self.errors.len());
    }

    /// Read a report written by [`BatchReport::write_json_file`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(std::io::Error::from)
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        fs::write(path, json)
    }
}
