//! Symptom name normalization.
//!
//! Symptom names are the batch key and the literature query input, so the
//! same symptom must always normalize to the same string regardless of
//! how the upstream aggregation cased or spaced it.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Any run of whitespace (spaces, tabs, newlines)
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Characters with meaning in literature query syntax
    static ref QUERY_RESERVED: Regex = Regex::new(r#"["\[\]()*]"#).unwrap();
}

/// Lowercase, trim and collapse internal whitespace.
///
/// ```
/// use vigil_core::normalize_symptom;
/// assert_eq!(normalize_symptom("  Hair   LOSS\n"), "hair loss");
/// ```
pub fn normalize_symptom(raw: &str) -> String {
    WHITESPACE
        .replace_all(raw.trim(), " ")
        .to_lowercase()
}

/// Normalize and drop query-reserved characters.
///
/// The result is safe to place inside a quoted phrase of a search term.
pub fn sanitize_for_query(raw: &str) -> String {
    let stripped = QUERY_RESERVED.replace_all(raw, " ");
    normalize_symptom(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_collapse() {
        assert_eq!(normalize_symptom("Nausea"), "nausea");
        assert_eq!(normalize_symptom("\tHair \n loss "), "hair loss");
        assert_eq!(normalize_symptom("hair loss"), normalize_symptom("HAIR  LOSS"));
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(normalize_symptom("   "), "");
    }

    #[test]
    fn test_sanitize_strips_reserved() {
        assert_eq!(sanitize_for_query("\"sulfur\" burps"), "sulfur burps");
        assert_eq!(sanitize_for_query("fatigue [Title]"), "fatigue title");
        assert_eq!(sanitize_for_query("gi (upset)*"), "gi upset");
    }
}
