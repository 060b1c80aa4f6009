//! Loading review exports
//!
//! An export is a JSON array of records, or an object with a `reviews` array.

use anyhow::{Context, Result};
use insight_cache::ReviewRecord;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum Export {
    Bare(Vec<ReviewRecord>),
    Wrapped { reviews: Vec<ReviewRecord> },
}

/// Parse an export from a string
pub fn parse_reviews(source: &str) -> Result<Vec<ReviewRecord>> {
    let export: Export = serde_json::from_str(source)
        .context("Expected a JSON array of reviews or an object with a \"reviews\" array")?;

    Ok(match export {
        Export::Bare(reviews) | Export::Wrapped { reviews } => reviews,
    })
}

/// Read and parse an export file
pub fn load_reviews(path: &Path) -> Result<Vec<ReviewRecord>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read reviews from {}", path.display()))?;
    parse_reviews(&source).with_context(|| format!("Invalid review export {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let reviews = parse_reviews(
            r#"[{"id": "r1", "rating": 4.5, "timestamp": "2024-05-01T10:00:00Z", "text": "Nice"}]"#,
        )
        .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].text.as_deref(), Some("Nice"));
    }

    #[test]
    fn test_parse_wrapped_export() {
        let reviews = parse_reviews(
            r#"{"reviews": [
                {"id": "r1", "rating": 1, "timestamp": "2024-05-01T10:00:00+02:00"},
                {"id": "r2", "rating": 5, "timestamp": "2024-05-02T10:00:00Z"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].timestamp.to_rfc3339(), "2024-05-01T08:00:00+00:00");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(parse_reviews(r#"{"items": []}"#).is_err());
        assert!(parse_reviews("not json").is_err());
    }
}
