//! Conversation messages: a role plus an ordered list of parts.

use super::events::ErrorKind;
use super::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// Conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    /// Call id of the incomplete tool invocation this message answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumes: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::text(text)],
            resumes: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            parts: vec![MessagePart::text(text)],
            resumes: None,
        }
    }

    pub fn with_parts(role: MessageRole, parts: Vec<MessagePart>) -> Self {
        Self {
            role,
            parts,
            resumes: None,
        }
    }

    pub fn resuming(mut self, call_id: impl Into<String>) -> Self {
        self.resumes = Some(call_id.into());
        self
    }

    /// Concatenation of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = (&ToolCall, Option<&ToolResult>)> {
        self.parts.iter().filter_map(|p| match p {
            MessagePart::ToolInvocation { call, result } => Some((call, result.as_ref())),
            _ => None,
        })
    }

    /// The error part recorded for a given tool call, if that call failed.
    pub fn failure_for(&self, call_id: &str) -> Option<(&ErrorKind, &str)> {
        self.parts.iter().find_map(|p| match p {
            MessagePart::Error {
                kind,
                detail,
                call_id: Some(id),
            } if id == call_id => Some((kind, detail.as_str())),
            _ => None,
        })
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        content: String,
    },
    ToolInvocation {
        call: ToolCall,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ToolResult>,
    },
    /// A failure kept in the transcript so history stays a complete audit trail.
    Error {
        kind: ErrorKind,
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
}

impl MessagePart {
    pub fn text(content: impl Into<String>) -> Self {
        MessagePart::Text {
            content: content.into(),
        }
    }

    pub fn invocation(call: ToolCall) -> Self {
        MessagePart::ToolInvocation { call, result: None }
    }

    pub fn error(kind: ErrorKind, detail: impl Into<String>, call_id: Option<String>) -> Self {
        MessagePart::Error {
            kind,
            detail: detail.into(),
            call_id,
        }
    }
}
