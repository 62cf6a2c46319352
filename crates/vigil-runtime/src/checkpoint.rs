//! Checkpoint persistence for resumable batches.
//!
//! After every validated item the runner rewrites the checkpoint with all
//! records so far. Writes go to a sibling temp file that is then renamed
//! over the checkpoint, so a crash mid-write leaves the previous version
//! intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vigil_core::{RecordError, Scorer, ValidationRecord};

const CHECKPOINT_VERSION: u32 = 1;

/// Errors reading or writing a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(#[from] RecordError),
}

/// On-disk checkpoint contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,

    /// Records in input order
    pub records: Vec<ValidationRecord>,
}

/// Reads and writes one checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, `None` when there is none yet.
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&contents)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion(checkpoint.version));
        }
        Ok(Some(checkpoint))
    }

    /// Load and verify records, keyed by symptom.
    ///
    /// Every record must re-score to the same values under `scorer`; a
    /// checkpoint written under different thresholds is rejected rather
    /// than mixed into the new report.
    pub fn restore(
        &self,
        scorer: &Scorer,
    ) -> Result<HashMap<String, ValidationRecord>, CheckpointError> {
        let Some(checkpoint) = self.load()? else {
            return Ok(HashMap::new());
        };

        let mut records = HashMap::with_capacity(checkpoint.records.len());
        for record in checkpoint.records {
            record.verify(scorer)?;
            records.insert(record.symptom.clone(), record);
        }

        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            saved_at = %checkpoint.saved_at,
            "Restored checkpoint"
        );
        Ok(records)
    }

    /// Atomically replace the checkpoint with `records`.
    pub fn save(&self, records: &[ValidationRecord]) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            records: records.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&checkpoint)?;

        let tmp = self.tmp_path();
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|source| {
            let _ = fs::remove_file(&tmp);
            self.io_error(source)
        })?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "Checkpoint saved");
        Ok(())
    }

    /// Delete the checkpoint, if any.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
