//! SQL Extraction
//!
//! Instruction models often wrap their answer in a fenced code block. This module
//! recovers the statement: the interior of the first ```` ```sql ```` block, or the
//! whole text when there is none. It does not check that the result is valid SQL.

use once_cell::sync::Lazy;
use regex::Regex;

/// First ```` ```sql ... ``` ```` block, shortest match, dot matches newline
static SQL_FENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```sql(.*?)```").expect("fence pattern is valid"));

/// Extract the executable statement from raw model output
#[must_use]
pub fn extract_sql(raw: &str) -> String {
    SQL_FENCE_REGEX
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str())
        .trim()
        .to_string()
}

/// Raw model output together with the statement extracted from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub raw: String,
    pub statement: String,
}

impl GeneratedQuery {
    #[must_use]
    pub fn from_raw(raw: String) -> Self {
        let statement = extract_sql(&raw);
        Self { raw, statement }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fenced_block_extracted() {
        let raw = "Here is the query:\n```sql\nSELECT COUNT(*) FROM Customer WHERE Country = 'France';\n```\nThis counts French customers.";
        assert_eq!(extract_sql(raw), "SELECT COUNT(*) FROM Customer WHERE Country = 'France';");
    }

    #[test]
    fn test_plain_text_trimmed() {
        assert_eq!(extract_sql("  SELECT 1\n\n"), "SELECT 1");
    }

    #[test]
    fn test_first_block_wins() {
        let raw = "```sql\nSELECT 1\n```\nor\n```sql\nSELECT 2\n```";
        assert_eq!(extract_sql(raw), "SELECT 1");
    }

    #[test]
    fn test_shortest_span_to_first_closing_fence() {
        // The interior stops at the first closing fence, even if it is another opener
        let raw = "```sql SELECT a ```sql SELECT b ```";
        assert_eq!(extract_sql(raw), "SELECT a");
    }

    #[test]
    fn test_untagged_fence_not_matched() {
        let raw = "```\nSELECT 1\n```";
        assert_eq!(extract_sql(raw), raw);
    }

    #[test]
    fn test_unclosed_fence_falls_back_to_whole_text() {
        let raw = "```sql\nSELECT 1";
        assert_eq!(extract_sql(raw), raw);
    }

    #[test]
    fn test_uppercase_tag_not_matched() {
        let raw = "```SQL\nSELECT 1\n```";
        assert_eq!(extract_sql(raw), raw);
    }

    #[test]
    fn test_idempotent() {
        for raw in [
            "```sql\n SELECT * FROM Album \n```",
            "  SELECT * FROM Track  ",
            "prose ```sql SELECT 1``` more ```sql SELECT 2```",
        ] {
            let once = extract_sql(raw);
            assert_eq!(extract_sql(&once), once);
        }
    }

    #[test]
    fn test_generated_query_keeps_raw() {
        let generated = GeneratedQuery::from_raw("```sql\nSELECT 1\n```".to_string());
        assert_eq!(generated.statement, "SELECT 1");
        assert!(generated.raw.starts_with("```sql"));
    }
}
