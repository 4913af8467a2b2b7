//! Message template engine — `{placeholder}` extraction, validation, and
//! rendering against per-recipient variable maps.
//!
//! Rendering is deliberately forgiving: a missing variable leaves its
//! placeholder in the text verbatim and the result is still usable. Only an
//! empty template is a hard rendering failure.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::types::{VariableMap, value_to_text};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Any brace-delimited span, valid or not. Runs to the first closing brace,
/// so a nested `{` lands inside the captured name and fails the name grammar.
/// Used by validation only.
static BRACE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^}]*)\}").unwrap());

static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// The outcome of rendering one template for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutcome {
    pub rendered: String,
    /// A partial render (missing variables left verbatim) still counts as
    /// success; only an outright rendering failure clears this.
    pub success: bool,
    pub missing_variables: Vec<String>,
    pub error: Option<String>,
}

/// Summary of a template, for preview surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub variables: Vec<String>,
    pub validation_errors: Vec<String>,
    pub is_valid: bool,
    pub character_count: usize,
    pub line_count: usize,
}

/// Extract placeholder names in first-occurrence order, duplicates removed.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Validate a template. Returns human-readable problems; empty means valid.
pub fn validate(template: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if template.trim().is_empty() {
        errors.push("Template cannot be empty".to_string());
        return errors;
    }

    for caps in BRACE_SPAN.captures_iter(template) {
        let name = &caps[1];
        if !VALID_NAME.is_match(name) {
            errors.push(format!(
                "Invalid variable name: '{name}'. Variables must start with a letter \
                 or underscore, followed by letters, numbers, or underscores."
            ));
        }
    }

    let open = template.matches('{').count();
    let close = template.matches('}').count();
    if open != close {
        errors.push(format!("Mismatched braces: {open} opening, {close} closing"));
    }

    errors
}

/// Render a template against a variable map.
///
/// Missing variables degrade the render (listed in `missing_variables`, left
/// as literal `{name}` in the text) without failing it.
pub fn render(template: &str, variables: &VariableMap) -> RenderOutcome {
    if template.is_empty() {
        return RenderOutcome {
            rendered: String::new(),
            success: false,
            missing_variables: Vec::new(),
            error: Some("Template is empty".to_string()),
        };
    }

    let required = extract_placeholders(template);
    if required.is_empty() {
        // No placeholders: everyone gets the same message.
        return RenderOutcome {
            rendered: template.to_string(),
            success: true,
            missing_variables: Vec::new(),
            error: None,
        };
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|name| !variables.contains_key(*name))
        .cloned()
        .collect();

    let rendered = PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            match variables.get(&caps[1]) {
                Some(value) => value_to_text(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    if !missing.is_empty() {
        tracing::warn!("Missing variables in template: {}", missing.join(", "));
    }

    RenderOutcome {
        rendered,
        success: true,
        missing_variables: missing,
        error: None,
    }
}

/// Everything a preview surface wants to show about a template.
pub fn template_info(template: &str) -> TemplateInfo {
    let validation_errors = validate(template);
    TemplateInfo {
        variables: extract_placeholders(template),
        is_valid: validation_errors.is_empty(),
        validation_errors,
        character_count: template.chars().count(),
        line_count: if template.is_empty() {
            0
        } else {
            template.matches('\n').count() + 1
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> VariableMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect()
    }

    #[test]
    fn test_extract_dedup_first_occurrence() {
        let names = extract_placeholders("Hello {name}, {name} again {co}");
        assert_eq!(names, vec!["name", "co"]);
    }

    #[test]
    fn test_extract_ignores_invalid_names() {
        assert!(extract_placeholders("Hi {1name} {x-y}").is_empty());
    }

    #[test]
    fn test_validate_ok() {
        assert!(validate("Hello {name}, welcome to {company}!").is_empty());
    }

    #[test]
    fn test_validate_rejects_digit_first_name() {
        let errors = validate("Hi {1name}");
        assert!(errors.iter().any(|e| e.contains("1name")));
    }

    #[test]
    fn test_validate_rejects_nested_braces() {
        // Braces balance 2/2, but the span up to the first `}` is not a
        // valid variable name, so validation still rejects it.
        let errors = validate("Hello {outer {name}}");
        assert!(errors.iter().any(|e| e.contains("'outer {name'")));
    }

    #[test]
    fn test_validate_brace_mismatch() {
        let errors = validate("Hi {name");
        assert!(errors.iter().any(|e| e.contains("1 opening, 0 closing")));
    }

    #[test]
    fn test_validate_empty() {
        assert_eq!(validate("   "), vec!["Template cannot be empty".to_string()]);
    }

    #[test]
    fn test_render_full_substitution() {
        let outcome = render(
            "Hello {name}, welcome to {company}!",
            &vars(&[("name", "Alice"), ("company", "ACME")]),
        );
        assert!(outcome.success);
        assert!(outcome.missing_variables.is_empty());
        assert_eq!(outcome.rendered, "Hello Alice, welcome to ACME!");
    }

    #[test]
    fn test_render_partial_keeps_missing_verbatim() {
        let outcome = render(
            "Hello {name}, welcome to {company}!",
            &vars(&[("name", "Alice")]),
        );
        assert!(outcome.success);
        assert_eq!(outcome.missing_variables, vec!["company"]);
        assert_eq!(outcome.rendered, "Hello Alice, welcome to {company}!");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_render_no_placeholders_returns_template() {
        let outcome = render("Same message for everyone", &VariableMap::new());
        assert!(outcome.success);
        assert_eq!(outcome.rendered, "Same message for everyone");
        assert!(outcome.missing_variables.is_empty());
    }

    #[test]
    fn test_render_empty_template_fails() {
        let outcome = render("", &VariableMap::new());
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Template is empty"));
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let outcome = render("{name} and {name}", &vars(&[("name", "Bob")]));
        assert_eq!(outcome.rendered, "Bob and Bob");
    }

    #[test]
    fn test_render_numeric_value() {
        let mut variables = VariableMap::new();
        variables.insert("count".into(), serde_json::json!(7));
        let outcome = render("You have {count} tickets", &variables);
        assert_eq!(outcome.rendered, "You have 7 tickets");
    }

    #[test]
    fn test_template_info() {
        let info = template_info("Hi {name}\nBye {name}");
        assert_eq!(info.variables, vec!["name"]);
        assert!(info.is_valid);
        assert_eq!(info.line_count, 2);
    }
}
