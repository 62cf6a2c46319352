//! Source factory pattern for choosing a literature backend by name.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = SourceRegistry::with_defaults();
//! let source = registry.create("fixture", &json!({"path": "literature.json"}))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LiteratureSource, QueryError};

/// Factory for creating literature sources from configuration.
pub trait SourceFactory: Send + Sync {
    /// Unique identifier for this source type, e.g. "pubmed".
    fn source_type(&self) -> &'static str;

    /// Create a source from JSON configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LiteratureSource>, QueryError>;

    /// Validate configuration without creating a source.
    fn validate_config(&self, config: &JsonValue) -> Result<(), QueryError>;

    /// Defaults for optional fields.
    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "Literature source"
    }
}

/// Registry of available source factories.
#[derive(Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, Arc<dyn SourceFactory>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any factory of the same type.
    pub fn register(&mut self, factory: Arc<dyn SourceFactory>) {
        self.factories
            .insert(factory.source_type().to_string(), factory);
    }

    /// Create a source from type name and configuration.
    pub fn create(
        &self,
        source_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LiteratureSource>, QueryError> {
        self.factory(source_type)?.create(config)
    }

    /// Validate configuration for a source type.
    pub fn validate(&self, source_type: &str, config: &JsonValue) -> Result<(), QueryError> {
        self.factory(source_type)?.validate_config(config)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_source(&self, source_type: &str) -> bool {
        self.factories.contains_key(source_type)
    }

    pub fn default_config(&self, source_type: &str) -> Option<JsonValue> {
        self.factories.get(source_type).map(|f| f.default_config())
    }

    /// Registry with the PubMed and fixture sources.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::PubmedSourceFactory));
        registry.register(Arc::new(super::FixtureSourceFactory));
        registry
    }

    fn factory(&self, source_type: &str) -> Result<&Arc<dyn SourceFactory>, QueryError> {
        self.factories.get(source_type).ok_or_else(|| {
            QueryError::NotConfigured(format!(
                "Unknown source type: '{}'. Available: {:?}",
                source_type,
                self.available_types()
            ))
        })
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.available_types())
            .finish()
    }
}
