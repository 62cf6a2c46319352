//! Query construction from a symptom name.

use serde::{Deserialize, Serialize};
use vigil_core::{normalize_symptom, sanitize_for_query};

use super::QueryError;

/// Per-query settings shared by every symptom in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Terms ANDed onto every query as an OR group, e.g. drug names
    pub context_terms: Vec<String>,

    /// Upper bound on papers returned per symptom
    pub max_papers: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            context_terms: Vec::new(),
            max_papers: 5,
        }
    }
}

/// A normalized literature query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiteratureQuery {
    /// Batch key the query was built from
    pub symptom: String,

    /// Symptom with query syntax characters removed
    pub term: String,

    /// Sanitized, non-empty context terms
    pub context_terms: Vec<String>,

    pub max_papers: usize,
}

impl LiteratureQuery {
    /// Build a query, failing when nothing searchable is left of the name.
    pub fn new(symptom: &str, options: &QueryOptions) -> Result<Self, QueryError> {
        let term = sanitize_for_query(symptom);
        if term.is_empty() {
            return Err(QueryError::MalformedQuery(format!(
                "'{}' has no searchable characters",
                symptom
            )));
        }

        let context_terms = options
            .context_terms
            .iter()
            .map(|t| sanitize_for_query(t))
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            symptom: normalize_symptom(symptom),
            term,
            context_terms,
            max_papers: options.max_papers,
        })
    }

    /// Key identifying queries that must return the same result.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.term,
            self.context_terms.join(","),
            self.max_papers
        )
    }
}
