//! Tool executor: structural validation, then the tool's own business logic.
//!
//! The two layers stay separate. A malformed call (schema mismatch) is a
//! [`ToolError::InvalidInput`]; a well-formed but underspecified call is the
//! tool's decision and comes back as `Ok(ToolResult::Incomplete { .. })`.

use crate::registry::ToolDefinition;
use crate::schema::{describe, Violation};
use crate::types::ToolResult;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};

/// Per-call tool failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input for tool '{tool}': {}", describe(.violations))]
    InvalidInput {
        tool: String,
        violations: Vec<Violation>,
    },

    #[error("tool '{tool}' failed: {cause}")]
    Execution { tool: String, cause: String },
}

impl ToolError {
    pub fn tool(&self) -> &str {
        match self {
            ToolError::InvalidInput { tool, .. } | ToolError::Execution { tool, .. } => tool,
        }
    }
}

/// Stateless executor; cheap to clone into spawned tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolExecutor;

impl ToolExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        definition: &ToolDefinition,
        raw_input: Value,
    ) -> Result<ToolResult, ToolError> {
        let tool = definition.name();
        let input = definition
            .schema()
            .validate(&raw_input)
            .map_err(|violations| ToolError::InvalidInput {
                tool: tool.to_string(),
                violations,
            })?;

        let started = Instant::now();
        let result = definition
            .handler()
            .call(input)
            .await
            .map_err(|e| ToolError::Execution {
                tool: tool.to_string(),
                cause: format!("{:#}", e),
            })?;

        if let ToolResult::Incomplete { missing_fields, .. } = &result {
            for field in missing_fields.iter() {
                if !definition.schema().declares(field) {
                    warn!(
                        tool,
                        field, "incomplete result names a field the input schema does not declare"
                    );
                }
            }
        }

        debug!(
            tool,
            incomplete = result.is_incomplete(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool executed"
        );
        Ok(result)
    }
}
