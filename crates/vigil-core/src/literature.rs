//! Literature query results.

use serde::{Deserialize, Serialize};

/// Metadata for one paper returned by a literature source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,

    /// Publication year, when the source reports a parseable date
    #[serde(default)]
    pub year: Option<i32>,

    pub journal: String,
}

/// Outcome of one literature query for a symptom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LiteratureResult {
    /// Total number of matching papers reported by the source
    pub paper_count: u64,

    /// Top papers in source order (relevance or recency)
    #[serde(default)]
    pub papers: Vec<Paper>,
}

impl LiteratureResult {
    pub fn new(paper_count: u64, papers: Vec<Paper>) -> Self {
        Self {
            paper_count,
            papers,
        }
    }

    /// Keep at most `max_papers` papers, preserving source order.
    pub fn truncated(mut self, max_papers: usize) -> Self {
        self.papers.truncate(max_papers);
        self
    }
}
