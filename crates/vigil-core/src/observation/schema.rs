//! JSON Schema validation for observation files.
//!
//! Observation files are validated against schema/observation_batch.schema.json
//! before deserialization, so structural problems are reported with the
//! offending path instead of a serde position.

use lazy_static::lazy_static;

const BATCH_SCHEMA_JSON: &str = include_str!("../../../../schema/observation_batch.schema.json");

lazy_static! {
    /// The embedded schema, compiled on first use. A broken schema is a
    /// build defect and surfaces as a violation on every document.
    static ref BATCH_SCHEMA: Result<jsonschema::Validator, String> = compile(BATCH_SCHEMA_JSON);
}

fn compile(schema: &str) -> Result<jsonschema::Validator, String> {
    let value: serde_json::Value =
        serde_json::from_str(schema).map_err(|e| format!("invalid schema JSON: {}", e))?;
    jsonschema::validator_for(&value).map_err(|e| format!("schema does not compile: {}", e))
}

/// Validate an observation batch document against the schema.
///
/// Returns every violation as `"<message> at <path>"`.
pub fn validate_batch_schema(batch_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = BATCH_SCHEMA.as_ref().map_err(|e| vec![e.clone()])?;

    let errors: Vec<String> = validator
        .iter_errors(batch_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
