//! Tool calling types: model-facing descriptors, calls, and the two-variant tool result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Tool descriptor exposed to the model (function calling)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type")]
    pub tool_type: String, // "function"
    pub function: FunctionDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>, // JSON Schema
}

impl ToolDescriptor {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDescriptor {
                name: name.into(),
                description: Some(description.into()),
                parameters: Some(parameters),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Tool call (invocation requested by the model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within one turn.
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Capture UI the client must show to collect missing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Affordance {
    /// Dedicated form for the credit status of a credit customer.
    CreditStatusForm,
    /// Pick exactly one value from a fixed list.
    SingleChoice,
    /// Free-form text entry.
    FreeText,
    /// Yes/no confirmation.
    Confirmation,
}

impl Affordance {
    pub const ALL: [Affordance; 4] = [
        Affordance::CreditStatusForm,
        Affordance::SingleChoice,
        Affordance::FreeText,
        Affordance::Confirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Affordance::CreditStatusForm => "credit-status-form",
            Affordance::SingleChoice => "single-choice",
            Affordance::FreeText => "free-text",
            Affordance::Confirmation => "confirmation",
        }
    }

    /// Whether the affordance presents a closed list of choices.
    pub fn is_selector(&self) -> bool {
        matches!(
            self,
            Affordance::CreditStatusForm | Affordance::SingleChoice | Affordance::Confirmation
        )
    }
}

impl fmt::Display for Affordance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Affordance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Affordance::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Unknown affordance: {}", s))
    }
}

/// Ordered, non-empty list of field names a tool still needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MissingFields(Vec<String>);

impl MissingFields {
    /// Returns `None` when `fields` is empty.
    pub fn new(fields: Vec<String>) -> Option<Self> {
        if fields.is_empty() {
            None
        } else {
            Some(Self(fields))
        }
    }

    pub fn one(field: impl Into<String>) -> Self {
        Self(vec![field.into()])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TryFrom<Vec<String>> for MissingFields {
    type Error = String;

    fn try_from(fields: Vec<String>) -> Result<Self, Self::Error> {
        MissingFields::new(fields).ok_or_else(|| "missingFields must not be empty".to_string())
    }
}

impl From<MissingFields> for Vec<String> {
    fn from(fields: MissingFields) -> Self {
        fields.0
    }
}

/// Outcome of a successful tool execution.
///
/// `Incomplete` is not an error: the tool ran, but a business rule needs more
/// input from the user before a final answer can be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Complete {
        payload: Value,
    },
    Incomplete {
        /// Partial data computed so far, shown alongside the prompt.
        payload: Value,
        #[serde(rename = "missingFields")]
        missing_fields: MissingFields,
        #[serde(rename = "requiredAffordance")]
        required_affordance: Affordance,
        message: String,
    },
}

impl ToolResult {
    pub fn complete(payload: Value) -> Self {
        ToolResult::Complete { payload }
    }

    pub fn incomplete(
        payload: Value,
        missing_fields: MissingFields,
        required_affordance: Affordance,
        message: impl Into<String>,
    ) -> Self {
        ToolResult::Incomplete {
            payload,
            missing_fields,
            required_affordance,
            message: message.into(),
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            ToolResult::Complete { payload } | ToolResult::Incomplete { payload, .. } => payload,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, ToolResult::Incomplete { .. })
    }

    /// Empty for `Complete`, non-empty for `Incomplete`.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ToolResult::Complete { .. } => &[],
            ToolResult::Incomplete { missing_fields, .. } => missing_fields.as_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_rejects_empty() {
        assert!(MissingFields::new(vec![]).is_none());
        let parsed: Result<MissingFields, _> = serde_json::from_value(json!([]));
        assert!(parsed.is_err());
    }

    #[test]
    fn incomplete_serializes_with_camel_case_protocol_keys() {
        let result = ToolResult::incomplete(
            json!({"customerId": "CREDIT-001"}),
            MissingFields::one("creditStatus"),
            Affordance::CreditStatusForm,
            "need status",
        );
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["status"], "incomplete");
        assert_eq!(wire["missingFields"], json!(["creditStatus"]));
        assert_eq!(wire["requiredAffordance"], "credit-status-form");
        let back: ToolResult = serde_json::from_value(wire).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn incomplete_with_empty_missing_fields_does_not_deserialize() {
        let wire = json!({
            "status": "incomplete",
            "payload": {},
            "missingFields": [],
            "requiredAffordance": "single-choice",
            "message": "x"
        });
        assert!(serde_json::from_value::<ToolResult>(wire).is_err());
    }

    #[test]
    fn exactly_one_variant_shape() {
        let complete = ToolResult::complete(json!({"ok": true}));
        assert!(!complete.is_incomplete());
        assert!(complete.missing_fields().is_empty());

        let incomplete = ToolResult::incomplete(
            json!({}),
            MissingFields::one("unit"),
            Affordance::SingleChoice,
            "pick a unit",
        );
        assert!(incomplete.is_incomplete());
        assert_eq!(incomplete.missing_fields(), &["unit".to_string()][..]);
    }

    #[test]
    fn affordance_parses_from_wire_names() {
        for a in Affordance::ALL {
            assert_eq!(a.as_str().parse::<Affordance>().unwrap(), a);
        }
        assert!("dropdown".parse::<Affordance>().is_err());
    }
}
