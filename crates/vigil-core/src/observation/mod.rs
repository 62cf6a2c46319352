//! Symptom observations: the input unit of a validation batch.
//!
//! Observations are produced upstream by aggregating posts. This module
//! validates them on construction and parses observation files.

mod normalize;
mod parser;
mod schema;

pub use normalize::{normalize_symptom, sanitize_for_query};
pub use parser::{InclusionFilter, ObservationBatch, ObservationError};
pub use schema::validate_batch_schema;

use serde::Serialize;

use crate::scoring::check_frequency;

/// One symptom's mention and frequency data from the source corpus.
///
/// Fields are private so the invariants checked in [`Observation::new`]
/// hold for the lifetime of the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    symptom: String,
    mention_count: u64,
    post_count: u64,
    frequency: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    examples: Vec<String>,
}

impl Observation {
    /// Create a validated observation.
    ///
    /// The symptom name is normalized. Fails when the name is empty, when
    /// `post_count > mention_count`, or when the frequency is outside
    /// `[0, 1]`.
    pub fn new(
        symptom: impl AsRef<str>,
        mention_count: u64,
        post_count: u64,
        frequency: f64,
    ) -> Result<Self, ObservationError> {
        let symptom = normalize_symptom(symptom.as_ref());

        if symptom.is_empty() {
            return Err(ObservationError::invalid(symptom, "symptom name is empty"));
        }

        if post_count > mention_count {
            return Err(ObservationError::invalid(
                symptom,
                format!(
                    "post_count ({}) exceeds mention_count ({})",
                    post_count, mention_count
                ),
            ));
        }

        if let Err(e) = check_frequency(frequency) {
            return Err(ObservationError::invalid(symptom, e.to_string()));
        }

        Ok(Self {
            symptom,
            mention_count,
            post_count,
            frequency,
            category: None,
            examples: Vec::new(),
        })
    }

    /// Create an observation whose frequency is `post_count / total_posts`.
    pub fn from_counts(
        symptom: impl AsRef<str>,
        mention_count: u64,
        post_count: u64,
        total_posts: u64,
    ) -> Result<Self, ObservationError> {
        if total_posts == 0 {
            return Err(ObservationError::invalid(
                normalize_symptom(symptom.as_ref()),
                "frequency missing and total_posts is zero",
            ));
        }
        let frequency = post_count as f64 / total_posts as f64;
        Self::new(symptom, mention_count, post_count, frequency)
    }

    /// Attach a passthrough category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach example snippets, in order.
    pub fn with_examples(mut self, examples: Vec<String>) -> Self {
        self.examples = examples;
        self
    }

    pub fn symptom(&self) -> &str {
        &self.symptom
    }

    pub fn mention_count(&self) -> u64 {
        self.mention_count
    }

    pub fn post_count(&self) -> u64 {
        self.post_count
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }
}
