//! Surprise score: how under-documented a frequently reported symptom is.
//!
//! The score is `frequency / (1 + paper_count)`. It is non-decreasing in
//! frequency, non-increasing in paper count, zero when nobody reports the
//! symptom, and maximal for a given frequency when no paper mentions it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores at or above this value are labelled [`SurpriseLabel::High`].
pub const DEFAULT_HIGH_SURPRISE_THRESHOLD: f64 = 0.02;

/// Scores at or above this value (and below the high threshold) are
/// labelled [`SurpriseLabel::Moderate`].
pub const DEFAULT_MODERATE_SURPRISE_THRESHOLD: f64 = 0.005;

/// Categorical bucket for a surprise score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurpriseLabel {
    Low,
    Moderate,
    High,
}

impl SurpriseLabel {
    /// Bucket a score. Both thresholds are inclusive lower bounds.
    pub fn classify(score: f64, high_threshold: f64, moderate_threshold: f64) -> Self {
        if score >= high_threshold {
            SurpriseLabel::High
        } else if score >= moderate_threshold {
            SurpriseLabel::Moderate
        } else {
            SurpriseLabel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurpriseLabel::Low => "LOW",
            SurpriseLabel::Moderate => "MODERATE",
            SurpriseLabel::High => "HIGH",
        }
    }
}

impl fmt::Display for SurpriseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw surprise score. Inputs must already be range-checked.
pub(crate) fn surprise_score(frequency: f64, paper_count: u64) -> f64 {
    frequency * dampening(paper_count)
}

/// Literature dampening factor, `1 / (1 + paper_count)`.
///
/// Equals 1.0 when there are no papers and decays toward zero.
fn dampening(paper_count: u64) -> f64 {
    1.0 / (1.0 + paper_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_papers_keeps_full_frequency() {
        assert_eq!(surprise_score(0.223, 0), 0.223);
    }

    #[test]
    fn test_dampening_halves_with_one_paper() {
        assert!((surprise_score(0.2, 1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_frequency_scores_zero() {
        assert_eq!(surprise_score(0.0, 0), 0.0);
        assert_eq!(surprise_score(0.0, 1000), 0.0);
    }

    #[test]
    fn test_label_thresholds_are_inclusive() {
        let high = DEFAULT_HIGH_SURPRISE_THRESHOLD;
        let moderate = DEFAULT_MODERATE_SURPRISE_THRESHOLD;

        assert_eq!(SurpriseLabel::classify(0.02, high, moderate), SurpriseLabel::High);
        assert_eq!(
            SurpriseLabel::classify(0.019_999, high, moderate),
            SurpriseLabel::Moderate
        );
        assert_eq!(
            SurpriseLabel::classify(0.005, high, moderate),
            SurpriseLabel::Moderate
        );
        assert_eq!(
            SurpriseLabel::classify(0.004_999, high, moderate),
            SurpriseLabel::Low
        );
    }

    #[test]
    fn test_label_serializes_uppercase() {
        let json = serde_json::to_string(&SurpriseLabel::Moderate).unwrap();
        assert_eq!(json, "\"MODERATE\"");
        assert_eq!(SurpriseLabel::High.to_string(), "HIGH");
    }
}
