use crate::types::ModelEvent;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects streamed tool-call fragments (keyed by the provider's `index`)
/// into complete [`ModelEvent::ToolCallRequested`] events.
///
/// Arguments that do not parse as JSON are kept as a raw string so input
/// validation can report them.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<u64, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn on_delta(
        &mut self,
        index: u64,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let call = self.calls.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            call.id.get_or_insert_with(|| id.to_string());
        }
        if let Some(name) = name {
            call.name.push_str(name);
        }
        if let Some(fragment) = arguments {
            call.arguments.push_str(fragment);
        }
    }

    /// Drain everything collected so far, in index order.
    pub fn finish(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|c| {
                let trimmed = c.arguments.trim();
                let input = if trimmed.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(c.arguments.clone()))
                };
                ModelEvent::ToolCallRequested {
                    id: c.id,
                    name: c.name,
                    input,
                }
            })
            .collect()
    }
}
