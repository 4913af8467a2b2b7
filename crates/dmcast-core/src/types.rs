//! Shared domain types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A resolved workspace member who can receive a direct message.
///
/// Produced by directory resolution and immutable afterwards; lives only for
/// the duration of a single request or job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Platform-assigned stable id (e.g. `U123ABC456`).
    pub id: String,
    /// Canonical account name.
    pub name: String,
    /// Best display name (profile display name, else real name, else account name).
    pub display_name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Per-recipient placeholder values, keyed by placeholder name.
///
/// Values from delimited imports are plain strings; structured imports may
/// carry nested JSON values, which render as their JSON text.
pub type VariableMap = HashMap<String, serde_json::Value>;

/// Variable maps keyed by recipient identifier.
pub type UserVariables = HashMap<String, VariableMap>;

/// Message-text form of a variable value. Strings are inserted verbatim,
/// everything else keeps its JSON representation.
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
