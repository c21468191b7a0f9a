//! 补全请求协议：工具返回不完整结果后，由客户端收集缺失字段并重新提交。
//!
//! # Completion-Request Protocol
//!
//! When a tool invocation ends `Incomplete`, the turn stops and the client is
//! expected to:
//!
//! 1. show the result's `message` with the capture UI named by its
//!    [`Affordance`],
//! 2. collect the missing values and build a plain user message that restates
//!    the original arguments together with the new values
//!    ([`CompletionRequest::submit`]),
//! 3. send that message as an ordinary new turn.
//!
//! Nothing is kept server-side between the two turns; the restated text is what
//! lets the model call the same tool again with complete input. The optional
//! [`Message::resumes`] field carries the original call id for correlation only.
//!
//! This module also speaks the flat JSON convention some external tools use to
//! flag incompleteness (`__incomplete__`, `missingFields`, `requiredComponent`,
//! `message` merged into the payload).

use crate::registry::ToolRegistry;
use crate::types::{Message, MessageRole, MissingFields, ToolCall, ToolResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use crate::types::Affordance;

/// Marker key of the flat wire convention.
pub const INCOMPLETE_MARKER: &str = "__incomplete__";
const MISSING_FIELDS_KEY: &str = "missingFields";
const REQUIRED_COMPONENT_KEY: &str = "requiredComponent";
const MESSAGE_KEY: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("no value supplied for missing field '{field}'")]
    MissingValue { field: String },

    #[error("value {value} is not a valid choice for '{field}' (allowed: {})", .allowed.join(", "))]
    InvalidChoice {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("malformed incomplete marker: {reason}")]
    MalformedMarker { reason: String },
}

/// Client-side view of one incomplete tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Id of the incomplete call; doubles as the correlation id.
    pub call_id: String,
    pub tool: String,
    /// Arguments the model already supplied.
    pub provided: Map<String, Value>,
    pub missing_fields: Vec<String>,
    pub affordance: Affordance,
    pub message: String,
    /// Partial data to show next to the prompt.
    pub payload: Value,
    /// Allowed values per missing field, when the schema enumerates them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<String, Vec<Value>>,
}

impl CompletionRequest {
    /// `None` unless `result` is `Incomplete`.
    pub fn from_invocation(
        call: &ToolCall,
        result: &ToolResult,
        registry: Option<&ToolRegistry>,
    ) -> Option<Self> {
        let ToolResult::Incomplete {
            payload,
            missing_fields,
            required_affordance,
            message,
        } = result
        else {
            return None;
        };

        let mut choices = BTreeMap::new();
        if let Some(definition) = registry.and_then(|r| r.resolve(&call.name).ok()) {
            for field in missing_fields.iter() {
                if let Some(options) = definition.schema().choices(field) {
                    choices.insert(field.to_string(), options);
                }
            }
        }

        Some(Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            provided: call.input.as_object().cloned().unwrap_or_default(),
            missing_fields: missing_fields.as_slice().to_vec(),
            affordance: *required_affordance,
            message: message.clone(),
            payload: payload.clone(),
            choices,
        })
    }

    /// Open requests in the last message of `history`, if it is an assistant message.
    pub fn pending(history: &[Message], registry: Option<&ToolRegistry>) -> Vec<Self> {
        let Some(last) = history.last().filter(|m| m.role == MessageRole::Assistant) else {
            return Vec::new();
        };
        last.tool_invocations()
            .filter_map(|(call, result)| Self::from_invocation(call, result?, registry))
            .collect()
    }

    pub fn choices_for(&self, field: &str) -> Option<&[Value]> {
        self.choices.get(field).map(Vec::as_slice)
    }

    /// Build the follow-up user message from the collected values.
    pub fn submit(&self, values: Map<String, Value>) -> Result<Message, CompletionError> {
        let mut supplied = Vec::with_capacity(self.missing_fields.len());
        for field in &self.missing_fields {
            let value = match values.get(field) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.trim().is_empty() => None,
                Some(v) => Some(v),
            }
            .ok_or_else(|| CompletionError::MissingValue {
                field: field.clone(),
            })?;

            if let Some(allowed) = self.choices.get(field) {
                if !allowed.contains(value) {
                    return Err(CompletionError::InvalidChoice {
                        field: field.clone(),
                        value: value.to_string(),
                        allowed: allowed.iter().map(|v| v.to_string()).collect(),
                    });
                }
            }
            supplied.push((field.clone(), value.clone()));
        }

        let mut args: Vec<(String, Value)> = self
            .provided
            .iter()
            .filter(|(k, _)| !self.missing_fields.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        args.extend(supplied);

        Ok(Message::user(restate(&self.tool, &args)).resuming(self.call_id.clone()))
    }

    /// Convenience for the common single-field case.
    pub fn submit_one(&self, field: &str, value: Value) -> Result<Message, CompletionError> {
        let mut values = Map::new();
        values.insert(field.to_string(), value);
        self.submit(values)
    }
}

/// Render a self-contained request to run `tool` with `args`.
///
/// Scalars round-trip through [`parse_restatement`]; nested values are written
/// as JSON but not recovered.
pub fn restate(tool: &str, args: &[(String, Value)]) -> String {
    let pairs = args
        .iter()
        .map(|(k, v)| format!("{}={}", restate_key(k), v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Please run the {} tool again with {}", tool, pairs)
}

/// Bare keys are word characters and `-`; anything else is JSON-quoted.
fn restate_key(key: &str) -> String {
    if BARE_KEY.is_match(key) {
        key.to_string()
    } else {
        Value::String(key.to_string()).to_string()
    }
}

static RESTATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"run the ([\w-]+) tool again with (.+)$").expect("static regex")
});

static BARE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w-]+$").expect("static regex"));

static PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"("(?:[^"\\]|\\.)*"|[\w-]+)=("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|true|false|null)"#,
    )
    .expect("static regex")
});

/// Recover the tool name and scalar arguments from a [`restate`]d message.
pub fn parse_restatement(text: &str) -> Option<(String, Map<String, Value>)> {
    let caps = RESTATEMENT.captures(text.trim())?;
    let tool = caps.get(1)?.as_str().to_string();
    let mut args = Map::new();
    for pair in PAIR.captures_iter(caps.get(2)?.as_str()) {
        let key = if pair[1].starts_with('"') {
            match serde_json::from_str::<String>(&pair[1]) {
                Ok(key) => key,
                Err(_) => continue,
            }
        } else {
            pair[1].to_string()
        };
        if let Ok(value) = serde_json::from_str::<Value>(&pair[2]) {
            args.insert(key, value);
        }
    }
    Some((tool, args))
}

/// Interpret a flat tool payload, honouring the `__incomplete__` marker.
pub fn decode_marked_payload(value: Value) -> Result<ToolResult, CompletionError> {
    let marked = value
        .get(INCOMPLETE_MARKER)
        .and_then(|m| m.as_bool())
        .unwrap_or(false);
    let Value::Object(mut obj) = value else {
        return Ok(ToolResult::complete(value));
    };
    if !marked {
        obj.remove(INCOMPLETE_MARKER);
        return Ok(ToolResult::complete(Value::Object(obj)));
    }

    obj.remove(INCOMPLETE_MARKER);
    let missing: Vec<String> = obj
        .remove(MISSING_FIELDS_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let missing_fields = MissingFields::new(missing).ok_or_else(|| CompletionError::MalformedMarker {
        reason: format!("'{}' must be a non-empty list of field names", MISSING_FIELDS_KEY),
    })?;

    let affordance = obj
        .remove(REQUIRED_COMPONENT_KEY)
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| CompletionError::MalformedMarker {
            reason: format!("'{}' is required", REQUIRED_COMPONENT_KEY),
        })?
        .parse::<Affordance>()
        .map_err(|reason| CompletionError::MalformedMarker { reason })?;

    let message = obj
        .remove(MESSAGE_KEY)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();

    Ok(ToolResult::incomplete(
        Value::Object(obj),
        missing_fields,
        affordance,
        message,
    ))
}

/// Flatten a result into the marker convention.
pub fn encode_marked_payload(result: &ToolResult) -> Value {
    match result {
        ToolResult::Complete { payload } => payload.clone(),
        ToolResult::Incomplete {
            payload,
            missing_fields,
            required_affordance,
            message,
        } => {
            let mut obj = match payload {
                Value::Object(o) => o.clone(),
                Value::Null => Map::new(),
                other => {
                    let mut m = Map::new();
                    m.insert("value".to_string(), other.clone());
                    m
                }
            };
            obj.insert(INCOMPLETE_MARKER.to_string(), Value::Bool(true));
            obj.insert(
                MISSING_FIELDS_KEY.to_string(),
                Value::from(missing_fields.as_slice().to_vec()),
            );
            obj.insert(
                REQUIRED_COMPONENT_KEY.to_string(),
                Value::String(required_affordance.as_str().to_string()),
            );
            obj.insert(MESSAGE_KEY.to_string(), Value::String(message.clone()));
            Value::Object(obj)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessagePart;
    use serde_json::json;

    fn incomplete_customer() -> (ToolCall, ToolResult) {
        let call = ToolCall::new("call_1", "customer", json!({"customerId": "CREDIT-001"}));
        let result = ToolResult::incomplete(
            json!({"customerId": "CREDIT-001", "status": "活跃"}),
            MissingFields::one("creditStatus"),
            Affordance::CreditStatusForm,
            "查询授信客户信息需补充授信状态",
        );
        (call, result)
    }

    fn with_choices(mut req: CompletionRequest) -> CompletionRequest {
        req.choices.insert(
            "creditStatus".into(),
            vec![json!("已授信"), json!("未授信"), json!("授信未提现"), json!("已提现")],
        );
        req
    }

    #[test]
    fn complete_results_have_no_request() {
        let call = ToolCall::new("c", "weather", json!({}));
        assert!(CompletionRequest::from_invocation(&call, &ToolResult::complete(json!({})), None).is_none());
    }

    #[test]
    fn submit_restates_original_key_and_new_value() {
        let (call, result) = incomplete_customer();
        let req = with_choices(CompletionRequest::from_invocation(&call, &result, None).unwrap());
        let msg = req.submit_one("creditStatus", json!("授信未提现")).unwrap();

        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.resumes.as_deref(), Some("call_1"));
        let text = msg.text();
        assert!(text.contains(r#"customerId="CREDIT-001""#));
        assert!(text.contains(r#"creditStatus="授信未提现""#));

        let (tool, args) = parse_restatement(&text).unwrap();
        assert_eq!(tool, "customer");
        assert_eq!(args["customerId"], "CREDIT-001");
        assert_eq!(args["creditStatus"], "授信未提现");
    }

    #[test]
    fn submit_requires_every_missing_field() {
        let (call, result) = incomplete_customer();
        let req = CompletionRequest::from_invocation(&call, &result, None).unwrap();
        assert_eq!(
            req.submit(Map::new()).unwrap_err(),
            CompletionError::MissingValue {
                field: "creditStatus".into()
            }
        );
        assert!(req.submit_one("creditStatus", json!("  ")).is_err());
    }

    #[test]
    fn submit_checks_choices() {
        let (call, result) = incomplete_customer();
        let req = with_choices(CompletionRequest::from_invocation(&call, &result, None).unwrap());
        let err = req.submit_one("creditStatus", json!("冻结")).unwrap_err();
        assert!(matches!(err, CompletionError::InvalidChoice { .. }));
    }

    #[test]
    fn pending_reads_only_the_last_assistant_message() {
        let (call, result) = incomplete_customer();
        let reply = Message::with_parts(
            MessageRole::Assistant,
            vec![MessagePart::ToolInvocation {
                call,
                result: Some(result),
            }],
        );
        let history = vec![Message::user("查客户 CREDIT-001"), reply];
        assert_eq!(CompletionRequest::pending(&history, None).len(), 1);

        let mut answered = history.clone();
        answered.push(Message::user("later"));
        assert!(CompletionRequest::pending(&answered, None).is_empty());
    }

    #[test]
    fn restatement_handles_numbers_and_bools() {
        let text = restate(
            "lookup",
            &[
                ("limit".into(), json!(5)),
                ("strict".into(), json!(true)),
                ("note".into(), json!("a, \"quoted\" value")),
            ],
        );
        let (_, args) = parse_restatement(&text).unwrap();
        assert_eq!(args["limit"], 5);
        assert_eq!(args["strict"], true);
        assert_eq!(args["note"], "a, \"quoted\" value");
        assert!(parse_restatement("北京今天天气如何？").is_none());
    }

    #[test]
    fn restatement_keeps_unusual_keys() {
        let args = [
            ("授信状态".to_string(), json!("已授信")),
            ("zip-code".to_string(), json!("02139")),
            ("2fa".to_string(), json!(false)),
            ("a b=c, d".to_string(), json!(1)),
        ];
        let text = restate("profile", &args);
        assert!(text.contains("授信状态=\"已授信\""));
        assert!(text.contains("\"a b=c, d\"=1"));

        let (_, parsed) = parse_restatement(&text).unwrap();
        assert_eq!(parsed.len(), args.len());
        for (key, value) in &args {
            assert_eq!(parsed.get(key), Some(value), "{key}");
        }
    }

    #[test]
    fn marked_payload_decodes_to_incomplete() {
        let wire = json!({
            "customerId": "CREDIT-001",
            "__incomplete__": true,
            "missingFields": ["creditStatus"],
            "requiredComponent": "credit-status-form",
            "message": "查询授信客户信息需补充授信状态"
        });
        let result = decode_marked_payload(wire.clone()).unwrap();
        assert_eq!(result.missing_fields(), &["creditStatus".to_string()][..]);
        assert_eq!(result.payload(), &json!({"customerId": "CREDIT-001"}));
        assert_eq!(encode_marked_payload(&result), wire);
    }

    #[test]
    fn marker_without_fields_is_rejected() {
        let err = decode_marked_payload(json!({
            "__incomplete__": true,
            "missingFields": [],
            "requiredComponent": "single-choice"
        }))
        .unwrap_err();
        assert!(matches!(err, CompletionError::MalformedMarker { .. }));
    }

    #[test]
    fn unmarked_payload_is_complete() {
        let result = decode_marked_payload(json!({"imageUrl": "x"})).unwrap();
        assert_eq!(result, ToolResult::complete(json!({"imageUrl": "x"})));
        let scalar = decode_marked_payload(json!(3)).unwrap();
        assert_eq!(scalar, ToolResult::complete(json!(3)));
    }
}
