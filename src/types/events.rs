//! Streaming events: what the model emits and what a turn emits to the client.

use super::message::Message;
use super::tool::ToolResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category carried by per-call and turn-level error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Tool input failed schema validation.
    InvalidInput,
    /// The model named a tool that is not registered.
    UnknownTool,
    /// The tool is registered but not on this turn's allow-list.
    ToolNotAllowed,
    /// The tool's own execution failed.
    ToolExecution,
    /// The turn exceeded its wall-clock budget.
    Timeout,
    /// The model stream could not be opened or failed mid-stream.
    ModelStream,
    /// The model kept requesting tools past the step limit.
    StepLimit,
    /// The client cancelled the turn.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::ToolNotAllowed => "tool_not_allowed",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ModelStream => "model_stream",
            ErrorKind::StepLimit => "step_limit",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Kinds that only ever apply to a single tool call.
    pub fn is_per_call(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput
                | ErrorKind::UnknownTool
                | ErrorKind::ToolNotAllowed
                | ErrorKind::ToolExecution
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the model collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ModelEvent {
    /// Partial text output
    TextDelta { content: String },

    /// The model wants a tool invoked. The orchestrator assigns an id when none is given.
    ToolCallRequested {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        input: serde_json::Value,
    },
}

impl ModelEvent {
    pub fn text(content: impl Into<String>) -> Self {
        ModelEvent::TextDelta {
            content: content.into(),
        }
    }

    pub fn tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        ModelEvent::ToolCallRequested {
            id: None,
            name: name.into(),
            input,
        }
    }
}

/// Event emitted to the client during a turn, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum OutboundEvent {
    /// Model text, passed through as it arrives
    TextDelta { content: String },

    ToolCallStarted {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolCallResolved { id: String, result: ToolResult },

    /// A single tool call failed; sibling calls are unaffected
    ToolCallFailed {
        id: String,
        kind: ErrorKind,
        detail: String,
    },

    /// Terminal: the turn ended with an error and no `TurnDone` follows
    TurnError { kind: ErrorKind, detail: String },

    /// Terminal: the authoritative history after this turn
    TurnDone { final_history: Vec<Message> },
}

impl OutboundEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboundEvent::TurnError { .. } | OutboundEvent::TurnDone { .. }
        )
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            OutboundEvent::ToolCallStarted { id, .. }
            | OutboundEvent::ToolCallResolved { id, .. }
            | OutboundEvent::ToolCallFailed { id, .. } => Some(id),
            _ => None,
        }
    }
}
