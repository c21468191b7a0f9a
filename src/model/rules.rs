//! Offline keyword model.
//!
//! Good enough to drive the built-in tools end to end without network
//! access: it recognises weather, QR-code, and customer requests (several in
//! one message become parallel calls), replays restated completion messages,
//! and summarises tool results once they are folded back into context.

use super::{LanguageModel, ModelRequest};
use crate::completion::parse_restatement;
use crate::tools::{customer, qrcode, weather, CreditStatus};
use crate::types::{ModelEvent, ToolCall, ToolResult};
use crate::{BoxStream, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::time::Duration;

static CUSTOMER_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9])(CREDIT[-_]?[A-Za-z0-9]+|C\d{3,})").expect("static regex")
});

static CITY_ZH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\p{Han}]{2,}?)(?:今天|明天|现在)?的?天气").expect("static regex"));

static CITY_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)weather\s+(?:in|for|at)\s+([A-Za-z][A-Za-z .'-]*)").expect("static regex")
});

static QR_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:["“「](.+?)["”」])|(?:[:：]\s*(\S.*)$)"#).expect("static regex")
});

const CITY_PREFIXES: &[&str] = &["帮我查询", "帮我查", "查一下", "查询", "请问", "看看", "告诉我"];
const CHUNK_CHARS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct RuleBasedModel {
    chunk_delay: Option<Duration>,
}

impl RuleBasedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between streamed text chunks.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Decide the reply for `request` without streaming it.
    pub fn respond(&self, request: &ModelRequest) -> Vec<ModelEvent> {
        let folded = request.trailing_invocations();
        if !folded.is_empty() {
            return text_events(&summarize(&folded));
        }

        let Some(text) = request.last_user_text() else {
            return text_events("你好，请问需要什么帮助？");
        };

        if let Some((tool, args)) = parse_restatement(&text) {
            if request.offers(&tool) {
                return vec![ModelEvent::tool_call(tool, Value::Object(args))];
            }
            return text_events(&format!("工具 {} 当前不可用。", tool));
        }

        let mut calls = Vec::new();
        let mut notes = Vec::new();

        if mentions_weather(&text) {
            match weather_input(&text) {
                Some(input) => calls.push((weather::NAME, input)),
                None => notes.push("请告诉我要查询哪个城市的天气。".to_string()),
            }
        }
        if mentions_qrcode(&text) {
            match qr_text(&text) {
                Some(content) => calls.push((qrcode::NAME, json!({ "text": content }))),
                None => notes.push("请提供要生成二维码的内容。".to_string()),
            }
        }
        if let Some(input) = customer_input(&text) {
            calls.push((customer::NAME, input));
        }

        let (offered, unavailable): (Vec<_>, Vec<_>) =
            calls.into_iter().partition(|(name, _)| request.offers(name));
        for (name, _) in unavailable {
            notes.push(format!("工具 {} 当前不可用。", name));
        }

        let mut events = Vec::new();
        if !notes.is_empty() {
            events.extend(text_events(&notes.join("")));
        }
        if offered.is_empty() && notes.is_empty() {
            return text_events("我可以帮你查询天气、生成二维码或查询客户信息。");
        }
        events.extend(
            offered
                .into_iter()
                .map(|(name, input)| ModelEvent::tool_call(name, input)),
        );
        events
    }
}

fn text_events(text: &str) -> Vec<ModelEvent> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_CHARS)
        .map(|c| ModelEvent::text(c.iter().collect::<String>()))
        .collect()
}

fn mentions_weather(text: &str) -> bool {
    text.contains("天气") || text.to_lowercase().contains("weather")
}

fn mentions_qrcode(text: &str) -> bool {
    text.contains("二维码") || text.to_lowercase().contains("qr")
}

fn weather_input(text: &str) -> Option<Value> {
    let location = CITY_EN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim_end_matches(|ch: char| !ch.is_alphabetic())
                .to_string()
        })
        .or_else(|| {
            CITY_ZH.captures(text).and_then(|c| c.get(1)).map(|m| {
                let mut city = m.as_str();
                for prefix in CITY_PREFIXES {
                    city = city.strip_prefix(prefix).unwrap_or(city);
                }
                city.to_string()
            })
        })
        .filter(|city| !city.is_empty())?;

    let lower = text.to_lowercase();
    let unit = if text.contains("华氏") || lower.contains("fahrenheit") {
        "F"
    } else {
        "C"
    };
    Some(json!({ "location": location, "unit": unit }))
}

fn qr_text(text: &str) -> Option<String> {
    let caps = QR_TEXT.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn customer_input(text: &str) -> Option<Value> {
    let id = CUSTOMER_ID.captures(text)?.get(1)?.as_str().to_string();
    let mut input = Map::new();
    input.insert("customerId".into(), json!(id));

    // Longest label first so a longer status is not shadowed by a shorter one.
    let mut statuses = CreditStatus::ALL.to_vec();
    statuses.sort_by_key(|s| std::cmp::Reverse(s.as_str().chars().count()));
    if let Some(status) = statuses.into_iter().find(|s| text.contains(s.as_str())) {
        input.insert(customer::CREDIT_STATUS_FIELD.into(), json!(status.as_str()));
    }
    Some(Value::Object(input))
}

fn summarize(folded: &[(&ToolCall, Option<&ToolResult>)]) -> String {
    folded
        .iter()
        .map(|(call, result)| match result {
            Some(ToolResult::Complete { payload }) => describe(&call.name, payload),
            Some(ToolResult::Incomplete { message, .. }) => message.clone(),
            None => format!("{} 调用未成功。", call.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe(tool: &str, p: &Value) -> String {
    let s = |key: &str| p.get(key).map(display).unwrap_or_default();
    match tool {
        weather::NAME => format!(
            "{}当前{}，气温{}°{}，湿度{}%。",
            s("location"),
            s("condition"),
            s("temperature"),
            s("unit"),
            s("humidity")
        ),
        qrcode::NAME => format!("二维码已生成：{}", s("imageUrl")),
        customer::NAME => {
            let mut line = format!(
                "客户{}（{}）状态：{}，注册于{}。",
                s("customerName"),
                s("customerId"),
                s("status"),
                s("registrationDate")
            );
            if p.get("creditStatus").is_some() {
                line.push_str(&format!(
                    "授信状态：{}，授信额度：{}。",
                    s("creditStatus"),
                    s("creditAmount")
                ));
            }
            line
        }
        other => format!("{} 返回：{}", other, p),
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LanguageModel for RuleBasedModel {
    async fn generate(&self, request: ModelRequest) -> Result<BoxStream<'static, ModelEvent>> {
        let events = self.respond(&request);
        tracing::debug!(events = events.len(), "rule-based reply");
        let delay = self.chunk_delay;
        let stream = stream::iter(events).then(move |event| async move {
            if let (Some(d), ModelEvent::TextDelta { .. }) = (delay, &event) {
                tokio::time::sleep(d).await;
            }
            Ok(event)
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}
