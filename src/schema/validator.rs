//! Structural validation of tool inputs.
//!
//! A tool declares its input as a JSON Schema object. Validation here is purely
//! structural (presence, types, enums); business rules that need more than the
//! schema captures live in the tool itself and surface as `Incomplete` results.

use crate::schema::error::{SchemaError, Violation};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Compiled input schema of a tool.
#[derive(Clone)]
pub struct InputSchema {
    raw: Value,
    compiled: Arc<JSONSchema>,
}

impl InputSchema {
    /// Compile a schema. The top level must be `{"type": "object", ...}`.
    pub fn new(raw: Value) -> Result<Self, SchemaError> {
        let found = raw.get("type").and_then(|t| t.as_str());
        if found != Some("object") {
            return Err(SchemaError::NotAnObject {
                found: found.map(String::from),
            });
        }

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&raw)
            .map_err(|e| SchemaError::Invalid {
                reason: e.to_string(),
            })?;

        Ok(Self {
            raw,
            compiled: Arc::new(compiled),
        })
    }

    /// The schema as declared, for exposure to the model.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn properties(&self) -> Option<&Map<String, Value>> {
        self.raw.get("properties").and_then(|p| p.as_object())
    }

    /// Whether the schema declares `field` as a property.
    pub fn declares(&self, field: &str) -> bool {
        self.properties().is_some_and(|p| p.contains_key(field))
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.raw
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required_fields().contains(&field)
    }

    /// Allowed values of an enum-typed property.
    pub fn choices(&self, field: &str) -> Option<Vec<Value>> {
        self.properties()?
            .get(field)?
            .get("enum")?
            .as_array()
            .cloned()
    }

    pub fn description(&self, field: &str) -> Option<&str> {
        self.properties()?.get(field)?.get("description")?.as_str()
    }

    /// Validate `input`, filling absent optional properties from their `default`.
    ///
    /// Returns the normalized input, or every violation found.
    pub fn validate(&self, input: &Value) -> Result<Value, Vec<Violation>> {
        let Some(obj) = input.as_object() else {
            return Err(vec![Violation::root(format!(
                "expected a JSON object, got {}",
                type_name(input)
            ))]);
        };

        let mut filled = obj.clone();
        if let Some(properties) = self.properties() {
            for (name, prop_schema) in properties {
                if filled.contains_key(name) {
                    continue;
                }
                if let Some(default) = prop_schema.get("default") {
                    filled.insert(name.clone(), default.clone());
                }
            }
        }
        let filled = Value::Object(filled);

        let violations: Vec<Violation> = match self.compiled.validate(&filled) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| {
                    let field = match &e.kind {
                        ValidationErrorKind::Required { property } => property
                            .as_str()
                            .map(String::from)
                            .unwrap_or_else(|| property.to_string()),
                        _ => pointer_to_field(&e.instance_path.to_string()),
                    };
                    Violation::new(field, e.to_string())
                })
                .collect(),
        };

        if violations.is_empty() {
            Ok(filled)
        } else {
            Err(violations)
        }
    }
}

impl fmt::Debug for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSchema").field("raw", &self.raw).finish()
    }
}

fn pointer_to_field(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}
