//! # vigil-core
//!
//! Deterministic evidence scoring for patient-reported symptoms.
//!
//! Given how often a symptom is reported (frequency) and how many papers
//! document it (paper count), this crate answers:
//! - How surprising is this symptom's under-documentation?
//! - How well does the literature support it?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same `(frequency, paper_count)` always produces the same score, label and tier
//! 2. **No I/O in scoring**: Literature lookups live in `vigil-runtime`
//! 3. **Validated input**: Out-of-range observations fail, they are never clamped
//! 4. **Immutable records**: A record is assembled once and never patched
//!
//! ## Example
//!
//! ```rust
//! use vigil_core::{score, EvidenceTier, SurpriseLabel};
//!
//! let result = score(0.223, 0).unwrap();
//! assert_eq!(result.surprise_label, SurpriseLabel::High);
//! assert_eq!(result.evidence_tier, EvidenceTier::EmergingPattern);
//! ```

pub mod literature;
pub mod observation;
pub mod record;
pub mod report;
pub mod scoring;
pub mod summary;

// Re-export main types at crate root
pub use literature::{LiteratureResult, Paper};
pub use observation::{
    normalize_symptom, sanitize_for_query, InclusionFilter, Observation, ObservationBatch,
    ObservationError,
};
pub use record::{PubmedData, RecordError, RedditData, ValidationRecord};
pub use report::{
    BatchReport, BatchState, EmptyBatchPolicy, ErrorKind, ItemError, RunOutcome,
};
pub use scoring::{
    check_frequency, score, EvidenceTier, Score, Scorer, ScoringConfig, ScoringError,
    SurpriseLabel, TierThresholds, DEFAULT_HIGH_SURPRISE_THRESHOLD,
    DEFAULT_MODERATE_SURPRISE_THRESHOLD,
};
pub use summary::{is_hidden_gem, rank_by_surprise, BatchSummary, Summarizer};
