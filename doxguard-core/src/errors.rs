//! errors.rs - Custom error types for the doxguard-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that the command layer can match on.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// This enum represents all possible error types in the `doxguard-core` library.
///
/// Caller mistakes (`InvalidExpression`, `MissingField`, `ProtectedRule`, `NotFound`)
/// are reported synchronously and never change stored state. `PersistenceFailed`
/// means the in-memory state was left equal to the last durable write.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GuardError {
    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidExpression { pattern: String, reason: String },

    #[error("Required field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("Unknown detection category '{0}'")]
    UnknownCategory(String),

    #[error("Rule '{scope}/{category}' is system protected and cannot be modified this way")]
    ProtectedRule { scope: String, category: String },

    #[error("No rule '{rule_id}' found under '{scope}/{category}'")]
    NotFound {
        scope: String,
        category: String,
        rule_id: String,
    },

    #[error("Failed to persist document '{key}' after {attempts} attempt(s): {message}")]
    PersistenceFailed {
        key: String,
        attempts: u32,
        message: String,
    },

    #[error("Exclusion fast path and exception store disagree on probe '{probe}' (store: {store}, fast path: {fast_path})")]
    PatternDrift {
        probe: String,
        store: bool,
        fast_path: bool,
    },

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("An unexpected I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_rule_message_names_location() {
        let err = GuardError::ProtectedRule {
            scope: "_global".to_string(),
            category: "discordIds".to_string(),
        };
        assert!(err.to_string().contains("_global/discordIds"));
    }

    #[test]
    fn test_invalid_expression_wraps_regex_error() {
        let regex_err = regex::Regex::new("(unclosed").unwrap_err();
        let err = GuardError::InvalidExpression {
            pattern: "(unclosed".to_string(),
            reason: regex_err.to_string(),
        };
        assert!(err.to_string().starts_with("Invalid regular expression '(unclosed'"));
    }
}
