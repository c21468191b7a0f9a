//! Tool input schemas.
//!
//! - [`InputSchema`]: compiled JSON Schema with default filling
//! - [`Violation`]: one field-level reason an input was rejected
//! - [`SchemaError`]: the schema itself is unusable
//!
//! # Examples
//!
//! ```
//! use ai_assist_rust::schema::InputSchema;
//! use serde_json::json;
//!
//! let schema = InputSchema::new(json!({
//!     "type": "object",
//!     "properties": {"text": {"type": "string"}},
//!     "required": ["text"]
//! })).unwrap();
//!
//! assert!(schema.validate(&json!({"text": "hello"})).is_ok());
//! assert!(schema.validate(&json!({})).is_err());
//! ```

pub mod error;
pub mod validator;

pub use error::{describe, SchemaError, Violation};
pub use validator::InputSchema;
