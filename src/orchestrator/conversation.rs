use crate::types::{ErrorKind, Message, MessagePart, MessageRole, ToolCall, ToolResult};
use std::collections::BTreeSet;

/// History of one turn: the client-supplied messages plus the assistant
/// reply being built. Owned by a single turn and never shared.
///
/// The prior history is never mutated; the reply is appended exactly once,
/// by [`Conversation::finish`].
#[derive(Debug, Clone)]
pub struct Conversation {
    history: Vec<Message>,
    reply: Vec<MessagePart>,
    pending: BTreeSet<String>,
}

impl Conversation {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            history,
            reply: Vec::new(),
            pending: BTreeSet::new(),
        }
    }

    /// Append streamed text, merging with a directly preceding text part.
    pub fn push_text(&mut self, delta: &str) {
        if let Some(MessagePart::Text { content }) = self.reply.last_mut() {
            content.push_str(delta);
            return;
        }
        self.reply.push(MessagePart::text(delta));
    }

    pub fn push_call(&mut self, call: ToolCall) {
        self.pending.insert(call.id.clone());
        self.reply.push(MessagePart::invocation(call));
    }

    /// Attach `result` to the invocation part of call `id`.
    pub fn resolve(&mut self, id: &str, result: ToolResult) -> bool {
        let found = match self.invocation_mut(id) {
            Some(slot) => {
                *slot = Some(result);
                true
            }
            None => false,
        };
        self.pending.remove(id);
        found
    }

    /// Record a per-call failure as an error part tied to call `id`.
    pub fn fail(&mut self, id: &str, kind: ErrorKind, detail: impl Into<String>) {
        self.pending.remove(id);
        self.reply
            .push(MessagePart::error(kind, detail, Some(id.to_string())));
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// What the model sees on the next invocation: the prior history plus
    /// the reply so far.
    pub fn context(&self) -> Vec<Message> {
        let mut messages = self.history.clone();
        if !self.reply.is_empty() {
            messages.push(self.reply_message());
        }
        messages
    }

    /// The authoritative history: prior messages plus the new assistant message.
    pub fn finish(mut self) -> Vec<Message> {
        let reply = self.reply_message();
        self.history.push(reply);
        self.history
    }

    fn reply_message(&self) -> Message {
        Message::with_parts(MessageRole::Assistant, self.reply.clone())
    }

    fn invocation_mut(&mut self, id: &str) -> Option<&mut Option<ToolResult>> {
        self.reply.iter_mut().find_map(|p| match p {
            MessagePart::ToolInvocation { call, result } if call.id == id => Some(result),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_merges_until_a_call_intervenes() {
        let mut conv = Conversation::new(vec![Message::user("hi")]);
        conv.push_text("Hel");
        conv.push_text("lo");
        conv.push_call(ToolCall::new("c1", "weather", json!({"location": "北京"})));
        conv.push_text("!");

        let history = conv.finish();
        assert_eq!(history.len(), 2);
        let reply = &history[1];
        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.parts.len(), 3);
        assert_eq!(reply.text(), "Hello!");
    }

    #[test]
    fn resolve_and_fail_clear_pending() {
        let mut conv = Conversation::new(vec![Message::user("q")]);
        conv.push_call(ToolCall::new("a", "weather", json!({})));
        conv.push_call(ToolCall::new("b", "qrcode", json!({})));
        assert_eq!(conv.pending().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(conv.resolve("a", ToolResult::complete(json!({"ok": true}))));
        conv.fail("b", ErrorKind::InvalidInput, "text is required");
        assert_eq!(conv.pending_count(), 0);

        let context = conv.context();
        let reply = context.last().unwrap();
        let invocations: Vec<_> = reply.tool_invocations().collect();
        assert!(invocations[0].1.is_some());
        assert!(invocations[1].1.is_none());
        assert_eq!(
            reply.failure_for("b"),
            Some((&ErrorKind::InvalidInput, "text is required"))
        );
    }

    #[test]
    fn prior_history_is_untouched() {
        let prior = vec![Message::user("one"), Message::assistant("two"), Message::user("three")];
        let mut conv = Conversation::new(prior.clone());
        assert_eq!(conv.context(), prior);
        conv.push_text("four");
        let history = conv.finish();
        assert_eq!(&history[..3], &prior[..]);
    }
}
