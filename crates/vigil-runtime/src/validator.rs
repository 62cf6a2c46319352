//! Evidence validation: one observation in, one scored record out.
//!
//! The validator never fabricates literature. If the query fails, the
//! failure goes back to the caller as-is; a record with zero papers only
//! exists when the source actually reported zero papers.

use std::sync::Arc;
use thiserror::Error;
use vigil_core::{check_frequency, ErrorKind, Observation, Scorer, ValidationRecord};

use crate::client::{LiteratureClient, QueryFailure};

/// Errors from validating one observation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid observation '{symptom}': {reason}")]
    InvalidObservation { symptom: String, reason: String },

    #[error("Literature query for '{symptom}' failed: {failure}")]
    Query {
        symptom: String,
        failure: QueryFailure,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::InvalidObservation { .. } => ErrorKind::InvalidObservation,
            ValidationError::Query { failure, .. } => failure.kind(),
        }
    }

    /// Requests sent before the failure.
    pub fn attempts(&self) -> u32 {
        match self {
            ValidationError::InvalidObservation { .. } => 0,
            ValidationError::Query { failure, .. } => failure.attempts,
        }
    }

    pub fn symptom(&self) -> &str {
        match self {
            ValidationError::InvalidObservation { symptom, .. }
            | ValidationError::Query { symptom, .. } => symptom,
        }
    }
}

/// Joins an observation with its literature result.
pub struct EvidenceValidator {
    client: Arc<LiteratureClient>,
    scorer: Scorer,
}

impl EvidenceValidator {
    pub fn new(client: Arc<LiteratureClient>, scorer: Scorer) -> Self {
        Self { client, scorer }
    }

    /// Query the literature for `observation` and assemble its record.
    ///
    /// Input is checked before any query is sent.
    pub async fn validate(
        &self,
        observation: &Observation,
    ) -> Result<ValidationRecord, ValidationError> {
        let symptom = observation.symptom();

        check_frequency(observation.frequency()).map_err(|e| {
            ValidationError::InvalidObservation {
                symptom: symptom.to_string(),
                reason: e.to_string(),
            }
        })?;

        let literature =
            self.client
                .query(symptom)
                .await
                .map_err(|failure| ValidationError::Query {
                    symptom: symptom.to_string(),
                    failure,
                })?;

        let record = ValidationRecord::assemble(observation, literature, &self.scorer).map_err(
            |e| ValidationError::InvalidObservation {
                symptom: symptom.to_string(),
                reason: e.to_string(),
            },
        )?;

        tracing::info!(
            symptom,
            paper_count = record.pubmed_data.paper_count,
            surprise_score = record.surprise_score,
            label = %record.surprise_label,
            tier = record.evidence_tier.value(),
            "Validated symptom"
        );

        Ok(record)
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn client(&self) -> &LiteratureClient {
        &self.client
    }
}
