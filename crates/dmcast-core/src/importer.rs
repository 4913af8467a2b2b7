//! Upload parsing — delimited (CSV) and structured (JSON) variable imports,
//! plus `@mention` extraction from free text.
//!
//! Both parsers are row-tolerant: a malformed row is reported and skipped,
//! never fatal to the batch. Resolving parsed identifiers against the Slack
//! directory is the caller's job.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{DmCastError, Result};
use crate::types::VariableMap;

/// Columns/fields that can carry the recipient identifier, in priority order.
pub const IDENTIFIER_FIELDS: [&str; 4] = ["user_id", "username", "display_name", "name"];

/// `@name` tokens, including CJK name characters.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z0-9._\-\p{Hiragana}\p{Katakana}\p{Han}ー]+)").unwrap()
});

/// One parsed upload row: who to message and their variables.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRecord {
    pub identifier: String,
    /// Which field the identifier came from (`user_id`, `username`, ...).
    pub identifier_field: String,
    pub variables: VariableMap,
}

/// Upload formats the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Delimited,
    Structured,
}

/// Extract `@mentions` in first-occurrence order, duplicates removed.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut mentions = Vec::new();
    for caps in MENTION.captures_iter(text) {
        let name = &caps[1];
        if !mentions.iter().any(|m| m == name) {
            mentions.push(name.to_string());
        }
    }
    mentions
}

/// Parse a delimited upload. Requires a header row with at least one
/// identifier-bearing column; per-row problems are reported and skipped.
pub fn parse_delimited(text: &str) -> (Vec<ImportRecord>, Vec<String>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) if !h.is_empty() && h.iter().any(|f| !f.is_empty()) => {
            h.iter().map(|f| f.to_string()).collect()
        }
        Ok(_) => {
            errors.push("CSV file is empty or has no headers".to_string());
            return (records, errors);
        }
        Err(e) => {
            errors.push(format!("CSV parsing error: {e}"));
            return (records, errors);
        }
    };

    if !IDENTIFIER_FIELDS
        .iter()
        .any(|f| headers.iter().any(|h| h == f))
    {
        errors.push(format!(
            "CSV must contain at least one of: {}",
            IDENTIFIER_FIELDS.join(", ")
        ));
        return (records, errors);
    }

    for (index, row) in reader.records().enumerate() {
        // Header occupies line 1.
        let row_num = index + 2;
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("Row {row_num}: {e}"));
                continue;
            }
        };

        if row.iter().all(|field| field.is_empty()) {
            continue;
        }

        let fields: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(row.iter())
            .collect();

        let identified = IDENTIFIER_FIELDS.iter().find_map(|name| {
            fields
                .get(name)
                .filter(|value| !value.is_empty())
                .map(|value| (*name, *value))
        });
        let Some((identifier_field, identifier)) = identified else {
            errors.push(format!("Row {row_num}: no usable recipient identifier"));
            continue;
        };

        let mut variables = VariableMap::new();
        for (name, value) in &fields {
            if !IDENTIFIER_FIELDS.contains(name) && !value.is_empty() {
                variables.insert(
                    (*name).to_string(),
                    serde_json::Value::String((*value).to_string()),
                );
            }
        }

        records.push(ImportRecord {
            identifier: identifier.to_string(),
            identifier_field: identifier_field.to_string(),
            variables,
        });
    }

    (records, errors)
}

/// Parse a structured (JSON array) upload. Identifier resolution mirrors the
/// delimited case; non-scalar fields stay structured in the variable map.
pub fn parse_structured(text: &str) -> (Vec<ImportRecord>, Vec<String>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            errors.push(format!("Invalid JSON format: {e}"));
            return (records, errors);
        }
    };

    let Some(items) = value.as_array() else {
        errors.push("JSON must be an array of recipient objects".to_string());
        return (records, errors);
    };

    for (index, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            errors.push(format!("Item {index}: must be an object"));
            continue;
        };

        let identified = IDENTIFIER_FIELDS.iter().find_map(|name| {
            object
                .get(*name)
                .and_then(scalar_to_text)
                .filter(|text| !text.trim().is_empty())
                .map(|text| (*name, text.trim().to_string()))
        });
        let Some((identifier_field, identifier)) = identified else {
            errors.push(format!("Item {index}: no usable recipient identifier"));
            continue;
        };

        let mut variables = VariableMap::new();
        for (name, value) in object {
            if !IDENTIFIER_FIELDS.contains(&name.as_str()) && !value.is_null() {
                variables.insert(name.clone(), value.clone());
            }
        }

        records.push(ImportRecord {
            identifier,
            identifier_field: identifier_field.to_string(),
            variables,
        });
    }

    (records, errors)
}

/// Decide the upload format: trust a recognized extension, else sniff the
/// content (JSON first, then CSV). Empty input is always rejected.
pub fn detect_format(text: &str, filename: &str) -> Result<ImportFormat> {
    if text.trim().is_empty() {
        return Err(DmCastError::Import("File is empty".to_string()));
    }

    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") => return Ok(ImportFormat::Delimited),
        Some("json") => return Ok(ImportFormat::Structured),
        _ => {}
    }

    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
        return Ok(ImportFormat::Structured);
    }

    let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());
    if reader.headers().map(|h| !h.is_empty()).unwrap_or(false) {
        return Ok(ImportFormat::Delimited);
    }

    Err(DmCastError::Import("Unknown file format".to_string()))
}

/// Parse according to a detected format.
pub fn parse(text: &str, format: ImportFormat) -> (Vec<ImportRecord>, Vec<String>) {
    match format {
        ImportFormat::Delimited => parse_delimited(text),
        ImportFormat::Structured => parse_structured(text),
    }
}

fn scalar_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mentions_dedup() {
        let mentions = extract_mentions("@john.doe @jane-smith hello @john.doe");
        assert_eq!(mentions, vec!["john.doe", "jane-smith"]);
    }

    #[test]
    fn test_extract_mentions_cjk() {
        let mentions = extract_mentions("@田中 こんにちは @さとう");
        assert_eq!(mentions, vec!["田中", "さとう"]);
    }

    #[test]
    fn test_parse_delimited_basic() {
        let (records, errors) = parse_delimited("user_id,name\nU1,Alice\n");
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "U1");
        assert_eq!(records[0].identifier_field, "user_id");
        assert_eq!(records[0].variables["name"], serde_json::json!("Alice"));
    }

    #[test]
    fn test_parse_delimited_fallback_identifier() {
        let (records, errors) = parse_delimited("username,company\njdoe,ACME\n");
        assert!(errors.is_empty());
        assert_eq!(records[0].identifier, "jdoe");
        assert_eq!(records[0].identifier_field, "username");
        assert_eq!(records[0].variables["company"], serde_json::json!("ACME"));
    }

    #[test]
    fn test_parse_delimited_skips_blank_rows_and_reports_missing_id() {
        let (records, errors) = parse_delimited("user_id,company\n,\n,ACME\nU2,Globex\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "U2");
        assert_eq!(errors, vec!["Row 3: no usable recipient identifier"]);
    }

    #[test]
    fn test_parse_delimited_no_identifier_column() {
        let (records, errors) = parse_delimited("company,city\nACME,Tokyo\n");
        assert!(records.is_empty());
        assert!(errors[0].contains("must contain at least one of"));
    }

    #[test]
    fn test_parse_structured_basic() {
        let (records, errors) =
            parse_structured(r#"[{"user_id": "U1", "name": "Alice", "tags": ["a", "b"]}]"#);
        assert!(errors.is_empty());
        assert_eq!(records[0].identifier, "U1");
        // Non-scalar values stay structured.
        assert_eq!(records[0].variables["tags"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_parse_structured_rejects_non_array() {
        let (records, errors) = parse_structured(r#"{"user_id": "U1"}"#);
        assert!(records.is_empty());
        assert_eq!(errors, vec!["JSON must be an array of recipient objects"]);
    }

    #[test]
    fn test_parse_structured_non_object_item() {
        let (records, errors) = parse_structured(r#"[{"user_id": "U1"}, 42]"#);
        assert_eq!(records.len(), 1);
        assert_eq!(errors, vec!["Item 1: must be an object"]);
    }

    #[test]
    fn test_parse_structured_numeric_identifier() {
        let (records, errors) = parse_structured(r#"[{"name": 123, "x": "y"}]"#);
        assert!(errors.is_empty());
        assert_eq!(records[0].identifier, "123");
    }

    #[test]
    fn test_detect_format_by_extension() {
        assert_eq!(
            detect_format("whatever", "users.CSV").unwrap(),
            ImportFormat::Delimited
        );
        assert_eq!(
            detect_format("whatever", "users.json").unwrap(),
            ImportFormat::Structured
        );
    }

    #[test]
    fn test_detect_format_sniffs_content() {
        assert_eq!(
            detect_format(r#"[{"user_id": "U1"}]"#, "upload").unwrap(),
            ImportFormat::Structured
        );
        assert_eq!(
            detect_format("user_id,name\nU1,Alice\n", "upload").unwrap(),
            ImportFormat::Delimited
        );
    }

    #[test]
    fn test_detect_format_rejects_empty() {
        assert!(detect_format("  \n", "users.csv").is_err());
    }
}
