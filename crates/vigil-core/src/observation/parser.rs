//! Observation batch parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::{normalize_symptom, schema::validate_batch_schema, Observation};

/// Errors that can occur when loading observations.
#[derive(Error, Debug)]
pub enum ObservationError {
    #[error("Failed to read observation file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Observation file failed schema validation: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Invalid observation '{symptom}': {reason}")]
    Invalid { symptom: String, reason: String },

    #[error("Duplicate symptom after normalization: {0}")]
    DuplicateSymptom(String),
}

impl ObservationError {
    pub(crate) fn invalid(symptom: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            symptom: symptom.into(),
            reason: reason.into(),
        }
    }
}

/// Observation as it appears on disk; frequency may be omitted.
#[derive(Debug, Deserialize)]
struct ObservationEntry {
    symptom: String,
    mention_count: u64,
    post_count: u64,
    #[serde(default)]
    frequency: Option<f64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    examples: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BatchDocument {
    #[serde(default)]
    total_posts: Option<u64>,
    observations: Vec<ObservationEntry>,
}

/// Minimum volume for an observation to enter a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionFilter {
    /// Minimum mention count (inclusive)
    pub min_mentions: u64,

    /// Minimum frequency (inclusive)
    pub min_frequency: f64,
}

impl Default for InclusionFilter {
    fn default() -> Self {
        Self {
            min_mentions: 0,
            min_frequency: 0.0,
        }
    }
}

impl InclusionFilter {
    pub fn admits(&self, observation: &Observation) -> bool {
        observation.mention_count() >= self.min_mentions
            && observation.frequency() >= self.min_frequency
    }
}

/// An ordered, duplicate-free sequence of observations.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationBatch {
    total_posts: Option<u64>,
    observations: Vec<Observation>,
}

impl ObservationBatch {
    /// Build a batch from already-constructed observations.
    ///
    /// Rejects duplicate symptom names. Input order is preserved.
    pub fn new(
        total_posts: Option<u64>,
        observations: Vec<Observation>,
    ) -> Result<Self, ObservationError> {
        let mut seen = HashSet::new();
        for obs in &observations {
            if !seen.insert(obs.symptom().to_string()) {
                return Err(ObservationError::DuplicateSymptom(obs.symptom().to_string()));
            }
        }

        Ok(Self {
            total_posts,
            observations,
        })
    }

    /// Parse a batch from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ObservationError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a batch from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ObservationError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a batch from a file, choosing the format by extension.
    ///
    /// `.yaml` and `.yml` are parsed as YAML, everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ObservationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            _ => Self::from_json(&contents),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ObservationError> {
        validate_batch_schema(&value).map_err(ObservationError::SchemaError)?;

        let document: BatchDocument = serde_json::from_value(value)?;
        let total_posts = document.total_posts;

        let observations = document
            .observations
            .into_iter()
            .map(|entry| entry.into_observation(total_posts))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            count = observations.len(),
            total_posts = ?total_posts,
            "Parsed observation batch"
        );

        Self::new(total_posts, observations)
    }

    /// Drop observations below the inclusion thresholds.
    ///
    /// Returns the names of the dropped symptoms; order of the kept ones
    /// is unchanged.
    pub fn retain_included(&mut self, filter: &InclusionFilter) -> Vec<String> {
        let mut dropped = Vec::new();
        self.observations.retain(|obs| {
            let keep = filter.admits(obs);
            if !keep {
                dropped.push(obs.symptom().to_string());
            }
            keep
        });

        if !dropped.is_empty() {
            tracing::debug!(dropped = ?dropped, "Observations below inclusion thresholds");
        }
        dropped
    }

    pub fn total_posts(&self) -> Option<u64> {
        self.total_posts
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl ObservationEntry {
    fn into_observation(self, total_posts: Option<u64>) -> Result<Observation, ObservationError> {
        let observation = match (self.frequency, total_posts) {
            (Some(frequency), _) => {
                Observation::new(&self.symptom, self.mention_count, self.post_count, frequency)?
            }
            (None, Some(total)) => {
                Observation::from_counts(&self.symptom, self.mention_count, self.post_count, total)?
            }
            (None, None) => {
                return Err(ObservationError::invalid(
                    normalize_symptom(&self.symptom),
                    "frequency missing and no total_posts supplied",
                ))
            }
        };

        let observation = match self.category {
            Some(category) => observation.with_category(category),
            None => observation,
        };

        Ok(observation.with_examples(self.examples))
    }
}
