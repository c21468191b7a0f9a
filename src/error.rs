use crate::completion::CompletionError;
use crate::registry::RegistryError;
use crate::schema::SchemaError;
use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "model.base_url", "history[0].role")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "runtime_config", "orchestrator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the assistant runtime.
///
/// Request-time failures of a running turn are reported in-band as
/// [`crate::types::OutboundEvent`]s; this type covers everything that happens
/// outside a turn's event stream (setup, configuration, collaborators).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Tool registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Model error: {message}{}", format_context(.context))]
    Model {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error: HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new model collaborator error with structured context
    pub fn model_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Model {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. }
            | Error::Model { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_rendered_in_display() {
        let err = Error::configuration_with_context(
            "turn timeout must be positive",
            ErrorContext::new()
                .with_field_path("turn_timeout_ms")
                .with_source("runtime_config"),
        );
        let text = err.to_string();
        assert!(text.contains("turn timeout must be positive"));
        assert!(text.contains("field: turn_timeout_ms"));
        assert!(text.contains("source: runtime_config"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("turn_timeout_ms")
        );
    }

    #[test]
    fn empty_context_adds_nothing() {
        let err = Error::model_with_context("boom", ErrorContext::default());
        assert_eq!(err.to_string(), "Model error: boom");
    }

    #[test]
    fn registry_errors_convert() {
        let err: Error = RegistryError::UnknownTool {
            name: "nope".into(),
        }
        .into();
        assert!(matches!(err, Error::Registry(_)));
        assert!(err.context().is_none());
    }

    #[test]
    fn completion_errors_convert() {
        let err: Error = CompletionError::MissingValue {
            field: "creditStatus".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Completion error: no value supplied for missing field 'creditStatus'"
        );
    }
}
