//! Client render adapter.
//!
//! [`Transcript`] folds a turn's [`OutboundEvent`]s, in arrival order, into
//! the visible conversation. Failures always become visible error parts.
//! After `TurnDone` the transcript adopts the returned history as
//! authoritative and exposes the open [`CompletionRequest`]s.

use crate::completion::CompletionRequest;
use crate::error::ErrorContext;
use crate::registry::ToolRegistry;
use crate::types::{Message, MessagePart, MessageRole, OutboundEvent, ToolResult};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    live: Option<Vec<MessagePart>>,
    completions: Vec<CompletionRequest>,
    registry: Option<Arc<ToolRegistry>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `registry` to attach enumerated choices to completion requests.
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Messages to submit as the next turn's history (before the new user message).
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn completions(&self) -> &[CompletionRequest] {
        &self.completions
    }

    /// Answer the open completion request for `call_id`. The returned
    /// message starts the next turn.
    pub fn complete(&self, call_id: &str, values: Map<String, Value>) -> Result<Message> {
        let request = self
            .completions
            .iter()
            .find(|r| r.call_id == call_id)
            .ok_or_else(|| {
                Error::validation_with_context(
                    "no open completion request for this call",
                    ErrorContext::new()
                        .with_field_path("call_id")
                        .with_details(call_id),
                )
            })?;
        Ok(request.submit(values)?)
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Append the user's message and open a live assistant reply.
    /// Returns the history to submit.
    pub fn begin_turn(&mut self, user: Message) -> Vec<Message> {
        self.commit_live();
        self.completions.clear();
        self.messages.push(user);
        self.live = Some(Vec::new());
        self.messages.clone()
    }

    pub fn apply(&mut self, event: &OutboundEvent) {
        match event {
            OutboundEvent::TextDelta { content } => {
                let parts = self.live_parts();
                if let Some(MessagePart::Text { content: text }) = parts.last_mut() {
                    text.push_str(content);
                } else {
                    parts.push(MessagePart::text(content.clone()));
                }
            }
            OutboundEvent::ToolCallStarted { id, name, input } => {
                self.live_parts().push(MessagePart::invocation(crate::types::ToolCall::new(
                    id.clone(),
                    name.clone(),
                    input.clone(),
                )));
            }
            OutboundEvent::ToolCallResolved { id, result } => {
                let slot = self.live_parts().iter_mut().find_map(|p| match p {
                    MessagePart::ToolInvocation { call, result } if &call.id == id => Some(result),
                    _ => None,
                });
                match slot {
                    Some(slot) => *slot = Some(result.clone()),
                    None => tracing::warn!(id = %id, "result for a call that never started"),
                }
            }
            OutboundEvent::ToolCallFailed { id, kind, detail } => {
                self.live_parts()
                    .push(MessagePart::error(*kind, detail.clone(), Some(id.clone())));
            }
            OutboundEvent::TurnError { kind, detail } => {
                self.live_parts()
                    .push(MessagePart::error(*kind, detail.clone(), None));
                self.commit_live();
            }
            OutboundEvent::TurnDone { final_history } => {
                self.live = None;
                self.messages = final_history.clone();
                self.completions =
                    CompletionRequest::pending(&self.messages, self.registry.as_deref());
            }
        }
    }

    /// Plain-text view of the whole conversation, live reply included.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            render_message(&mut out, message.role, &message.parts);
        }
        if let Some(parts) = &self.live {
            render_message(&mut out, MessageRole::Assistant, parts);
        }
        out
    }

    fn live_parts(&mut self) -> &mut Vec<MessagePart> {
        self.live.get_or_insert_with(Vec::new)
    }

    fn commit_live(&mut self) {
        if let Some(parts) = self.live.take() {
            if !parts.is_empty() {
                self.messages
                    .push(Message::with_parts(MessageRole::Assistant, parts));
            }
        }
    }
}

fn render_message(out: &mut String, role: MessageRole, parts: &[MessagePart]) {
    let label = match role {
        MessageRole::User => "用户",
        MessageRole::Assistant => "助手",
    };
    let _ = writeln!(out, "{}:", label);
    for part in parts {
        let _ = match part {
            MessagePart::Text { content } => writeln!(out, "  {}", content),
            MessagePart::ToolInvocation { call, result } => match result {
                None => writeln!(out, "  [{}] {} …", call.name, call.input),
                Some(ToolResult::Complete { payload }) => {
                    writeln!(out, "  [{}] ✓ {}", call.name, payload)
                }
                Some(ToolResult::Incomplete {
                    message,
                    missing_fields,
                    required_affordance,
                    ..
                }) => writeln!(
                    out,
                    "  [{}] ? {} (missing: {}; form: {})",
                    call.name,
                    message,
                    missing_fields.as_slice().join(", "),
                    required_affordance
                ),
            },
            MessagePart::Error { kind, detail, call_id } => match call_id {
                Some(id) => writeln!(out, "  [error:{} {}] {}", kind, id, detail),
                None => writeln!(out, "  [error:{}] {}", kind, detail),
            },
        };
    }
}
