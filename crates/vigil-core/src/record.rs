//! Validation records: one per successfully validated observation.
//!
//! A record is assembled in a single step from an observation, its
//! literature result and a scorer. There is no way to build a record with
//! only part of the scoring filled in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::literature::{LiteratureResult, Paper};
use crate::observation::{normalize_symptom, Observation};
use crate::scoring::{EvidenceTier, Scorer, ScoringError, SurpriseLabel};

/// Errors from record consistency checks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Inconsistent record for '{symptom}': {reason}")]
    Inconsistent { symptom: String, reason: String },
}

/// Patient-reported side of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditData {
    pub mention_count: u64,
    pub post_count: u64,
    pub frequency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Literature side of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubmedData {
    pub paper_count: u64,
    #[serde(default)]
    pub papers: Vec<Paper>,
}

/// The validated, scored view of one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub symptom: String,
    pub reddit_data: RedditData,
    pub pubmed_data: PubmedData,
    pub surprise_score: f64,
    pub surprise_label: SurpriseLabel,
    pub evidence_tier: EvidenceTier,
    pub tier_label: String,
}

impl ValidationRecord {
    /// Score an observation against its literature result.
    pub fn assemble(
        observation: &Observation,
        literature: LiteratureResult,
        scorer: &Scorer,
    ) -> Result<Self, ScoringError> {
        let score = scorer.score(observation.frequency(), literature.paper_count)?;

        Ok(Self {
            symptom: observation.symptom().to_string(),
            reddit_data: RedditData {
                mention_count: observation.mention_count(),
                post_count: observation.post_count(),
                frequency: observation.frequency(),
                category: observation.category().map(str::to_string),
                examples: observation.examples().to_vec(),
            },
            pubmed_data: PubmedData {
                paper_count: literature.paper_count,
                papers: literature.papers,
            },
            surprise_score: score.surprise_score,
            surprise_label: score.surprise_label,
            evidence_tier: score.evidence_tier,
            tier_label: score.tier_label.to_string(),
        })
    }

    /// Check that the derived fields match what `scorer` produces for the
    /// record's own `(frequency, paper_count)`.
    ///
    /// Used on records read back from disk.
    pub fn verify(&self, scorer: &Scorer) -> Result<(), RecordError> {
        let fail = |reason: String| RecordError::Inconsistent {
            symptom: self.symptom.clone(),
            reason,
        };

        if normalize_symptom(&self.symptom) != self.symptom || self.symptom.is_empty() {
            return Err(fail("symptom is not normalized".to_string()));
        }

        if self.reddit_data.post_count > self.reddit_data.mention_count {
            return Err(fail("post_count exceeds mention_count".to_string()));
        }

        let expected = scorer
            .score(self.reddit_data.frequency, self.pubmed_data.paper_count)
            .map_err(|e| fail(e.to_string()))?;

        if (expected.surprise_score - self.surprise_score).abs() > 1e-12 {
            return Err(fail(format!(
                "surprise_score {} does not match {}",
                self.surprise_score, expected.surprise_score
            )));
        }
        if expected.surprise_label != self.surprise_label {
            return Err(fail(format!(
                "surprise_label {} does not match {}",
                self.surprise_label, expected.surprise_label
            )));
        }
        if expected.evidence_tier != self.evidence_tier || expected.tier_label != self.tier_label {
            return Err(fail(format!(
                "tier {} '{}' does not match {}",
                self.evidence_tier.value(),
                self.tier_label,
                expected.evidence_tier
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> Observation {
        Observation::new("Sulfur Burps", 300, 223, 0.223)
            .unwrap()
            .with_category("gastrointestinal")
            .with_examples(vec!["rotten egg burps every night".to_string()])
    }

    #[test]
    fn test_assemble_copies_both_sides() {
        let literature = LiteratureResult::new(0, vec![]);
        let record = ValidationRecord::assemble(&observation(), literature, &Scorer::default()).unwrap();

        assert_eq!(record.symptom, "sulfur burps");
        assert_eq!(record.reddit_data.post_count, 223);
        assert_eq!(record.reddit_data.category.as_deref(), Some("gastrointestinal"));
        assert_eq!(record.pubmed_data.paper_count, 0);
        assert_eq!(record.surprise_label, SurpriseLabel::High);
        assert_eq!(record.evidence_tier, EvidenceTier::EmergingPattern);
        assert_eq!(record.tier_label, "Emerging Pattern");
    }

    #[test]
    fn test_serialized_shape() {
        let record =
            ValidationRecord::assemble(&observation(), LiteratureResult::default(), &Scorer::default())
                .unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["evidence_tier"], 4);
        assert_eq!(json["surprise_label"], "HIGH");
        assert_eq!(json["reddit_data"]["mention_count"], 300);
        assert_eq!(json["pubmed_data"]["paper_count"], 0);
    }

    #[test]
    fn test_verify_accepts_roundtrip() {
        let scorer = Scorer::default();
        let record = ValidationRecord::assemble(&observation(), LiteratureResult::default(), &scorer).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: ValidationRecord = serde_json::from_str(&json).unwrap();
        assert!(back.verify(&scorer).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_tier() {
        let scorer = Scorer::default();
        let mut record =
            ValidationRecord::assemble(&observation(), LiteratureResult::default(), &scorer).unwrap();
        record.evidence_tier = EvidenceTier::WellEstablished;

        assert!(matches!(
            record.verify(&scorer),
            Err(RecordError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_score() {
        let scorer = Scorer::default();
        let mut record =
            ValidationRecord::assemble(&observation(), LiteratureResult::default(), &scorer).unwrap();
        record.surprise_score = 0.9;

        assert!(record.verify(&scorer).is_err());
    }
}
