//! Summarizer: aggregates validation records into batch statistics.
//!
//! The summary is derived data. It never changes a record, and ranking
//! is a pure re-sort of the stable input order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::ValidationRecord;
use crate::scoring::{EvidenceTier, SurpriseLabel};

/// Counts and highlights for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_validated: usize,
    pub total_failed: usize,

    /// Record count per tier value; every tier is present
    pub by_tier: BTreeMap<u8, usize>,

    /// Record count per surprise label; every label is present
    pub by_label: BTreeMap<SurpriseLabel, usize>,

    pub high_surprise_count: usize,

    /// Highly surprising symptoms with little or no literature, most
    /// surprising first
    pub hidden_gems: Vec<String>,
}

/// Builds a [`BatchSummary`] from records.
pub struct Summarizer;

impl Summarizer {
    pub fn new() -> Self {
        Self
    }

    /// Summarize validated records plus the number of failed items.
    pub fn summarize(&self, records: &[ValidationRecord], failed: usize) -> BatchSummary {
        let mut by_tier: BTreeMap<u8, usize> =
            EvidenceTier::ALL.iter().map(|t| (t.value(), 0)).collect();
        let mut by_label: BTreeMap<SurpriseLabel, usize> = [
            SurpriseLabel::Low,
            SurpriseLabel::Moderate,
            SurpriseLabel::High,
        ]
        .into_iter()
        .map(|l| (l, 0))
        .collect();

        for record in records {
            *by_tier.entry(record.evidence_tier.value()).or_default() += 1;
            *by_label.entry(record.surprise_label).or_default() += 1;
        }

        let high_surprise_count = by_label[&SurpriseLabel::High];

        let hidden_gems = rank_by_surprise(records)
            .into_iter()
            .filter(|r| is_hidden_gem(r))
            .map(|r| r.symptom.clone())
            .collect();

        BatchSummary {
            total_validated: records.len(),
            total_failed: failed,
            by_tier,
            by_label,
            high_surprise_count,
            hidden_gems,
        }
    }
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new()
    }
}

/// HIGH surprise with at most limited literature behind it.
pub fn is_hidden_gem(record: &ValidationRecord) -> bool {
    record.surprise_label == SurpriseLabel::High
        && record.evidence_tier >= EvidenceTier::LimitedEvidence
}

/// Records ordered by descending surprise score.
///
/// The sort is stable, so ties keep their input order.
pub fn rank_by_surprise(records: &[ValidationRecord]) -> Vec<&ValidationRecord> {
    let mut ranked: Vec<&ValidationRecord> = records.iter().collect();
    ranked.sort_by(|a, b| b.surprise_score.total_cmp(&a.surprise_score));
    ranked
}
