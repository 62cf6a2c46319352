//! Evidence tiers: how well the literature supports an observation.
//!
//! Tiers are ordinal, 1 (strongest support) through 4 (patient-reported
//! only). A tier is derived from the paper count, with the paper
//! requirements raised for symptoms that are reported very widely: a
//! symptom one in ten patients mentions needs more literature behind it
//! to count as established than a rare one.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ScoringError;

/// Closed enumeration of evidence tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EvidenceTier {
    WellEstablished = 1,
    ModeratelySupported = 2,
    LimitedEvidence = 3,
    EmergingPattern = 4,
}

impl EvidenceTier {
    /// All tiers, strongest first.
    pub const ALL: [EvidenceTier; 4] = [
        EvidenceTier::WellEstablished,
        EvidenceTier::ModeratelySupported,
        EvidenceTier::LimitedEvidence,
        EvidenceTier::EmergingPattern,
    ];

    /// Numeric tier value (1-4).
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Fixed display string for this tier.
    pub fn label(&self) -> &'static str {
        match self {
            EvidenceTier::WellEstablished => "Well Established",
            EvidenceTier::ModeratelySupported => "Moderately Supported",
            EvidenceTier::LimitedEvidence => "Limited Evidence",
            EvidenceTier::EmergingPattern => "Emerging Pattern",
        }
    }
}

impl From<EvidenceTier> for u8 {
    fn from(tier: EvidenceTier) -> Self {
        tier.value()
    }
}

impl TryFrom<u8> for EvidenceTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EvidenceTier::WellEstablished),
            2 => Ok(EvidenceTier::ModeratelySupported),
            3 => Ok(EvidenceTier::LimitedEvidence),
            4 => Ok(EvidenceTier::EmergingPattern),
            other => Err(format!("evidence tier must be 1-4, got {}", other)),
        }
    }
}

impl fmt::Display for EvidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier {} ({})", self.value(), self.label())
    }
}

/// Paper-count boundaries between tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    /// Minimum papers for tier 1
    pub established_papers: u64,

    /// Minimum papers for tier 2
    pub supported_papers: u64,

    /// Frequency at or above which a symptom counts as highly prevalent
    pub high_prevalence_frequency: f64,

    /// Factor applied to the tier 1 and tier 2 minimums for highly
    /// prevalent symptoms
    pub high_prevalence_multiplier: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            established_papers: 50,
            supported_papers: 10,
            high_prevalence_frequency: 0.10,
            high_prevalence_multiplier: 2,
        }
    }
}

impl TierThresholds {
    /// Assign a tier. Inputs must already be range-checked.
    pub fn classify(&self, frequency: f64, paper_count: u64) -> EvidenceTier {
        let multiplier = if frequency >= self.high_prevalence_frequency {
            self.high_prevalence_multiplier
        } else {
            1
        };
        let established = self.established_papers.saturating_mul(multiplier);
        let supported = self.supported_papers.saturating_mul(multiplier);

        match paper_count {
            0 => EvidenceTier::EmergingPattern,
            n if n >= established => EvidenceTier::WellEstablished,
            n if n >= supported => EvidenceTier::ModeratelySupported,
            _ => EvidenceTier::LimitedEvidence,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ScoringError> {
        if self.supported_papers == 0 {
            return Err(ScoringError::InvalidConfig(
                "tiers.supported_papers must be at least 1".to_string(),
            ));
        }
        if self.established_papers <= self.supported_papers {
            return Err(ScoringError::InvalidConfig(format!(
                "tiers.established_papers ({}) must exceed tiers.supported_papers ({})",
                self.established_papers, self.supported_papers
            )));
        }
        if self.high_prevalence_multiplier == 0 {
            return Err(ScoringError::InvalidConfig(
                "tiers.high_prevalence_multiplier must be at least 1".to_string(),
            ));
        }
        if !(self.high_prevalence_frequency > 0.0 && self.high_prevalence_frequency <= 1.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "tiers.high_prevalence_frequency must be in (0, 1], got {}",
                self.high_prevalence_frequency
            )));
        }
        Ok(())
    }
}
