//! Streaming chat-completions client for OpenAI-compatible endpoints.
//!
//! Conversation history is flattened into the chat-completions message list:
//! assistant tool invocations become `tool_calls` followed by one `tool`
//! message per call. Incomplete results travel in the flat
//! `__incomplete__` convention so the model sees which fields are missing.

use super::assembler::ToolCallAssembler;
use super::{sse, LanguageModel, ModelRequest};
use crate::completion::encode_marked_payload;
use crate::config::ModelConfig;
use crate::error::ErrorContext;
use crate::transport::HttpTransport;
use crate::types::{Message, MessagePart, MessageRole, ModelEvent, ToolCall, ToolResult};
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

pub struct OpenAiCompatModel {
    transport: HttpTransport,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompatModel {
    pub fn new(transport: HttpTransport, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            temperature: None,
        }
    }

    /// Build from configuration; the API key is read from `config.api_key_env`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "no API key found; requests will be sent unauthenticated"
            );
        }
        let transport = HttpTransport::new(&config.base_url, api_key)?;
        Ok(Self {
            transport,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn build_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": to_wire_messages(&request.history),
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

/// Chat-completions message list for `history`.
pub fn to_wire_messages(history: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(history.len());
    for message in history {
        match message.role {
            MessageRole::User => out.push(json!({"role": "user", "content": message.text()})),
            MessageRole::Assistant => push_assistant(message, &mut out),
        }
    }
    out
}

/// One assistant message becomes one or more wire turns: text, then the calls
/// made after it, then their `tool` results. Text that follows a call opens a
/// new segment so answers never precede the results they were based on.
fn push_assistant(message: &Message, out: &mut Vec<Value>) {
    let mut text = String::new();
    let mut calls: Vec<(&ToolCall, Option<&ToolResult>)> = Vec::new();
    for part in &message.parts {
        match part {
            MessagePart::Text { content } => {
                if !calls.is_empty() {
                    flush_segment(message, &text, &calls, out);
                    text.clear();
                    calls.clear();
                }
                text.push_str(content);
            }
            MessagePart::ToolInvocation { call, result } => calls.push((call, result.as_ref())),
            // Read through `failure_for` when the call's result is encoded.
            MessagePart::Error { .. } => {}
        }
    }
    flush_segment(message, &text, &calls, out);
}

fn flush_segment(
    message: &Message,
    text: &str,
    calls: &[(&ToolCall, Option<&ToolResult>)],
    out: &mut Vec<Value>,
) {
    if text.is_empty() && calls.is_empty() {
        return;
    }
    let mut wire = json!({
        "role": "assistant",
        "content": if text.is_empty() { Value::Null } else { Value::String(text.to_string()) },
    });
    if !calls.is_empty() {
        wire["tool_calls"] = Value::Array(
            calls
                .iter()
                .map(|(call, _)| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": call.input.to_string()},
                    })
                })
                .collect(),
        );
    }
    out.push(wire);

    for &(call, result) in calls {
        let content = match (result, message.failure_for(&call.id)) {
            (Some(r @ ToolResult::Incomplete { .. }), _) => encode_marked_payload(r),
            (Some(ToolResult::Complete { payload }), _) => payload.clone(),
            (None, Some((kind, detail))) => json!({"error": kind.as_str(), "detail": detail}),
            (None, None) => json!({"error": "no_result"}),
        };
        out.push(json!({
            "role": "tool",
            "tool_call_id": call.id,
            "content": content.to_string(),
        }));
    }
}

struct ChunkState {
    frames: BoxStream<'static, Value>,
    assembler: ToolCallAssembler,
    pending: VecDeque<ModelEvent>,
    finished: bool,
}

fn read_chunk(chunk: &Value, state: &mut ChunkState) -> Result<()> {
    if let Some(err) = chunk.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return Err(Error::model_with_context(
            message,
            ErrorContext::new().with_source("chat/completions stream"),
        ));
    }

    let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
        return Ok(());
    };
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
        if !content.is_empty() {
            state.pending.push_back(ModelEvent::text(content));
        }
    }

    if let Some(calls) = delta.get("tool_calls").and_then(|c| c.as_array()) {
        for (position, call) in calls.iter().enumerate() {
            let index = call
                .get("index")
                .and_then(|i| i.as_u64())
                .unwrap_or(position as u64);
            let function = call.get("function");
            state.assembler.on_delta(
                index,
                call.get("id").and_then(|v| v.as_str()),
                function.and_then(|f| f.get("name")).and_then(|v| v.as_str()),
                function
                    .and_then(|f| f.get("arguments"))
                    .and_then(|v| v.as_str()),
            );
        }
    }

    if choice
        .get("finish_reason")
        .map(|r| !r.is_null())
        .unwrap_or(false)
    {
        state.pending.extend(state.assembler.finish());
    }
    Ok(())
}

/// Turn decoded chat-completions chunks into model events.
pub fn events_from_frames(frames: BoxStream<'static, Value>) -> BoxStream<'static, ModelEvent> {
    let state = ChunkState {
        frames,
        assembler: ToolCallAssembler::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.frames.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = read_chunk(&chunk, &mut state) {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    // Some providers end the stream without a finish_reason.
                    state.finished = true;
                    let rest = state.assembler.finish();
                    state.pending.extend(rest);
                }
            }
        }
    });
    Box::pin(stream)
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    async fn generate(&self, request: ModelRequest) -> Result<BoxStream<'static, ModelEvent>> {
        let body = self.build_body(&request);
        tracing::debug!(
            model = %self.model,
            messages = request.history.len(),
            tools = request.tools.len(),
            "requesting chat completion"
        );
        let bytes = self.transport.post_stream(CHAT_COMPLETIONS_PATH, &body).await?;
        Ok(events_from_frames(sse::decode(bytes)))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Affordance, ErrorKind, MissingFields};
    use futures::TryStreamExt;

    #[test]
    fn assistant_invocations_become_tool_messages() {
        let history = vec![
            Message::user("查询客户CREDIT-001和天气"),
            Message::with_parts(
                MessageRole::Assistant,
                vec![
                    MessagePart::ToolInvocation {
                        call: ToolCall::new("c1", "customer", json!({"customerId": "CREDIT-001"})),
                        result: Some(ToolResult::incomplete(
                            json!({"customerId": "CREDIT-001"}),
                            MissingFields::one("creditStatus"),
                            Affordance::CreditStatusForm,
                            "need status",
                        )),
                    },
                    MessagePart::ToolInvocation {
                        call: ToolCall::new("c2", "weather", json!({})),
                        result: None,
                    },
                    MessagePart::error(ErrorKind::InvalidInput, "location is required", Some("c2".into())),
                ],
            ),
        ];

        let wire = to_wire_messages(&history);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[1]["content"], Value::Null);
        assert_eq!(wire[1]["tool_calls"][0]["function"]["name"], "customer");
        assert_eq!(wire[2]["tool_call_id"], "c1");

        let marked: Value = serde_json::from_str(wire[2]["content"].as_str().unwrap()).unwrap();
        assert_eq!(marked["__incomplete__"], true);
        assert_eq!(marked["requiredComponent"], "credit-status-form");

        let failed: Value = serde_json::from_str(wire[3]["content"].as_str().unwrap()).unwrap();
        assert_eq!(failed["error"], "invalid_input");
    }

    #[test]
    fn folded_reply_keeps_part_order() {
        let mut conversation = crate::orchestrator::Conversation::new(vec![Message::user("二维码")]);
        conversation.push_text("生成中");
        conversation.push_call(ToolCall::new("q1", "qrcode", json!({"text": "hi"})));
        conversation.resolve("q1", ToolResult::complete(json!({"imageUrl": "u"})));
        conversation.push_text("二维码已生成");
        let history = conversation.finish();

        let wire = to_wire_messages(&history);
        let roles: Vec<_> = wire.iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
        assert_eq!(wire[1]["content"], "生成中");
        assert_eq!(wire[1]["tool_calls"][0]["id"], "q1");
        assert_eq!(wire[2]["tool_call_id"], "q1");
        assert_eq!(wire[3]["content"], "二维码已生成");
        assert!(wire[3].get("tool_calls").is_none());
    }

    #[test]
    fn text_only_assistant_is_a_single_message() {
        let wire = to_wire_messages(&[Message::user("hi"), Message::assistant("hello")]);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[1], json!({"role": "assistant", "content": "hello"}));
    }

    #[tokio::test]
    async fn text_and_fragmented_calls() {
        let frames: Vec<Result<Value>> = vec![
            Ok(json!({"choices":[{"delta":{"content":"好的"}}]})),
            Ok(json!({"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"weather","arguments":"{\"loc"}}]}}]})),
            Ok(json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ation\":\"上海\"}"}}]}}]})),
            Ok(json!({"choices":[{"delta":{},"finish_reason":"tool_calls"}]})),
        ];
        let events: Vec<ModelEvent> = events_from_frames(Box::pin(stream::iter(frames)))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            events,
            vec![
                ModelEvent::text("好的"),
                ModelEvent::ToolCallRequested {
                    id: Some("call_1".into()),
                    name: "weather".into(),
                    input: json!({"location": "上海"}),
                },
            ]
        );
    }

    #[tokio::test]
    async fn error_chunk_fails_stream() {
        let frames: Vec<Result<Value>> = vec![Ok(json!({"error": {"message": "rate limited"}}))];
        let result: Result<Vec<ModelEvent>> =
            events_from_frames(Box::pin(stream::iter(frames))).try_collect().await;
        assert!(matches!(result, Err(Error::Model { .. })));
    }
}
