//! Offline literature source backed by a JSON file.
//!
//! The file maps symptom names to results:
//!
//! ```json
//! {
//!   "sulfur burps": {"paper_count": 0, "papers": []},
//!   "nausea": {"paper_count": 412, "papers": [{"title": "...", "year": 2022, "journal": "..."}]}
//! }
//! ```
//!
//! A symptom missing from the file is an error, never zero papers.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use vigil_core::{normalize_symptom, LiteratureResult};

use super::{LiteratureQuery, LiteratureSource, QueryError, RequestPacer, SourceFactory};

pub struct FixtureSource {
    entries: HashMap<String, LiteratureResult>,
}

impl FixtureSource {
    /// Build from entries; keys are normalized like symptom names.
    pub fn new(entries: impl IntoIterator<Item = (String, LiteratureResult)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(symptom, result)| (normalize_symptom(&symptom), result))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        let entries: BTreeMap<String, LiteratureResult> =
            serde_json::from_str(json).map_err(|e| {
                QueryError::NotConfigured(format!("invalid literature fixture: {}", e))
            })?;
        Ok(Self::new(entries))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            QueryError::NotConfigured(format!(
                "cannot read literature fixture {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LiteratureSource for FixtureSource {
    /// Answers from memory; nothing goes through the pacer.
    async fn search(
        &self,
        query: &LiteratureQuery,
        _pacer: &RequestPacer<'_>,
    ) -> Result<LiteratureResult, QueryError> {
        self.entries
            .get(&query.symptom)
            .cloned()
            .map(|result| result.truncated(query.max_papers))
            .ok_or_else(|| QueryError::NotFound(query.symptom.clone()))
    }

    /// An empty fixture cannot answer anything.
    async fn health_check(&self) -> bool {
        !self.entries.is_empty()
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// Creates a [`FixtureSource`] from `{"path": "..."}`.
pub struct FixtureSourceFactory;

impl SourceFactory for FixtureSourceFactory {
    fn source_type(&self) -> &'static str {
        "fixture"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LiteratureSource>, QueryError> {
        self.validate_config(config)?;
        let path = config["path"].as_str().unwrap_or_default();
        let source = FixtureSource::from_file(path)?;
        tracing::debug!(path, entries = source.len(), "Loaded literature fixture");
        Ok(Arc::new(source))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), QueryError> {
        match config["path"].as_str() {
            Some(path) if !path.is_empty() => Ok(()),
            _ => Err(QueryError::NotConfigured(
                "fixture source requires 'path'".to_string(),
            )),
        }
    }

    fn description(&self) -> &'static str {
        "Offline literature results from a JSON file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::literature::QueryOptions;
    use crate::resilience::RateLimiter;
    use std::io::Write;
    use std::time::Duration;

    const FIXTURE: &str = r#"{
        "Sulfur Burps": {"paper_count": 0},
        "nausea": {"paper_count": 412, "papers": [
            {"title": "GI events with semaglutide", "year": 2022, "journal": "Diabetes Care"},
            {"title": "Nausea management", "year": 2023, "journal": "Obesity"}
        ]}
    }"#;

    fn query(symptom: &str, max_papers: usize) -> LiteratureQuery {
        let options = QueryOptions {
            max_papers,
            ..Default::default()
        };
        LiteratureQuery::new(symptom, &options).unwrap()
    }

    async fn search(
        source: &FixtureSource,
        query: &LiteratureQuery,
    ) -> Result<LiteratureResult, QueryError> {
        let limiter = RateLimiter::new(Duration::from_secs(1), Arc::new(ManualClock::new()));
        let pacer = RequestPacer::new(&limiter, Duration::from_secs(30));
        let result = source.search(query, &pacer).await;
        assert_eq!(pacer.requests(), 0);
        result
    }

    #[tokio::test]
    async fn test_lookup_normalizes_keys() {
        let source = FixtureSource::from_json(FIXTURE).unwrap();
        let result = search(&source, &query("sulfur burps", 5)).await.unwrap();
        assert_eq!(result.paper_count, 0);
    }

    #[tokio::test]
    async fn test_lookup_truncates_papers() {
        let source = FixtureSource::from_json(FIXTURE).unwrap();
        let result = search(&source, &query("Nausea", 1)).await.unwrap();
        assert_eq!(result.paper_count, 412);
        assert_eq!(result.papers.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_symptom_is_permanent_error() {
        let source = FixtureSource::from_json(FIXTURE).unwrap();
        let err = search(&source, &query("hair loss", 5)).await.unwrap_err();
        assert_eq!(err, QueryError::NotFound("hair loss".to_string()));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_fixture_is_unhealthy() {
        assert!(FixtureSource::from_json(FIXTURE).unwrap().health_check().await);
        assert!(!FixtureSource::from_json("{}").unwrap().health_check().await);
    }

    #[test]
    fn test_factory_requires_path() {
        assert!(FixtureSourceFactory
            .validate_config(&serde_json::json!({}))
            .is_err());
    }

    #[test]
    fn test_factory_loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let config = serde_json::json!({ "path": file.path().to_str().unwrap() });
        let source = FixtureSourceFactory.create(&config).unwrap();
        assert_eq!(source.name(), "fixture");
    }
}
