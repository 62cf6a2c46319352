//! Surprise scoring and evidence tiering.
//!
//! `score(frequency, paper_count)` is a pure, total function over valid
//! inputs. It produces two independent axes:
//! - **surprise**: how under-documented the symptom is relative to how
//!   often patients report it
//! - **tier**: how well the literature supports it at all
//!
//! A well documented symptom can still be surprising, and an emerging one
//! can be unsurprising if almost nobody reports it. Neither axis is
//! derived from the other.

mod surprise;
mod tier;

pub use surprise::{
    SurpriseLabel, DEFAULT_HIGH_SURPRISE_THRESHOLD, DEFAULT_MODERATE_SURPRISE_THRESHOLD,
};
pub use tier::{EvidenceTier, TierThresholds};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from scoring.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Invalid scoring configuration: {0}")]
    InvalidConfig(String),
}

/// Thresholds used by the [`Scorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Inclusive lower bound for HIGH surprise
    pub high_threshold: f64,

    /// Inclusive lower bound for MODERATE surprise
    pub moderate_threshold: f64,

    /// Tier boundaries
    pub tiers: TierThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_threshold: DEFAULT_HIGH_SURPRISE_THRESHOLD,
            moderate_threshold: DEFAULT_MODERATE_SURPRISE_THRESHOLD,
            tiers: TierThresholds::default(),
        }
    }
}

impl ScoringConfig {
    /// Check threshold ordering.
    ///
    /// The moderate threshold must be strictly positive so that a zero
    /// score always lands in the lowest label.
    pub fn validate(&self) -> Result<(), ScoringError> {
        if !(self.moderate_threshold.is_finite() && self.moderate_threshold > 0.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "moderate_threshold must be positive, got {}",
                self.moderate_threshold
            )));
        }
        if !(self.high_threshold.is_finite() && self.high_threshold >= self.moderate_threshold) {
            return Err(ScoringError::InvalidConfig(format!(
                "high_threshold ({}) must be >= moderate_threshold ({})",
                self.high_threshold, self.moderate_threshold
            )));
        }
        self.tiers.validate()
    }
}

/// Result of scoring one `(frequency, paper_count)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub surprise_score: f64,
    pub surprise_label: SurpriseLabel,
    pub evidence_tier: EvidenceTier,
    pub tier_label: &'static str,
}

/// Applies a validated [`ScoringConfig`].
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    /// Create a scorer, rejecting inconsistent thresholds.
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score an observation's frequency against its literature count.
    ///
    /// Fails with [`ScoringError::InvalidObservation`] when the frequency
    /// is not a finite value in `[0, 1]`. Out-of-range input is never
    /// clamped.
    pub fn score(&self, frequency: f64, paper_count: u64) -> Result<Score, ScoringError> {
        check_frequency(frequency)?;

        let surprise_score = surprise::surprise_score(frequency, paper_count);
        let surprise_label = SurpriseLabel::classify(
            surprise_score,
            self.config.high_threshold,
            self.config.moderate_threshold,
        );
        let evidence_tier = self.config.tiers.classify(frequency, paper_count);

        Ok(Score {
            surprise_score,
            surprise_label,
            evidence_tier,
            tier_label: evidence_tier.label(),
        })
    }

    /// Whether a label counts toward the high-surprise summary count.
    pub fn is_high(&self, score: f64) -> bool {
        score >= self.config.high_threshold
    }
}

/// Score with the default thresholds.
pub fn score(frequency: f64, paper_count: u64) -> Result<Score, ScoringError> {
    Scorer::default().score(frequency, paper_count)
}

/// Reject frequencies outside `[0, 1]`, NaN and infinities.
pub fn check_frequency(frequency: f64) -> Result<(), ScoringError> {
    if frequency.is_finite() && (0.0..=1.0).contains(&frequency) {
        Ok(())
    } else {
        Err(ScoringError::InvalidObservation(format!(
            "frequency must be in [0, 1], got {}",
            frequency
        )))
    }
}
