//! Error types for tool input schemas.

use std::fmt;

/// One reason a tool input failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path to the offending field (e.g. "creditStatus", "items.0"); empty for the input itself
    pub field: String,
    /// What is wrong with it
    pub reason: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A violation of the input as a whole rather than a single field.
    pub fn root(reason: impl Into<String>) -> Self {
        Self::new(String::new(), reason)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "(input): {}", self.reason)
        } else {
            write!(f, "{}: {}", self.field, self.reason)
        }
    }
}

/// Joins violations into one human-readable line.
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A tool's declared input schema is itself unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("input schema must describe an object (found type {found:?})")]
    NotAnObject { found: Option<String> },

    #[error("input schema does not compile: {reason}")]
    Invalid { reason: String },
}
