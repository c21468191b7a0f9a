//! 类型系统模块：消息、工具调用结果与流式事件。
//!
//! # Types Module
//!
//! Core data model shared by every layer of the runtime.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Role plus ordered parts (text, tool invocation, error) |
//! | [`ToolCall`] | Tool invocation requested by the model |
//! | [`ToolResult`] | `Complete` or `Incomplete` outcome of a tool |
//! | [`Affordance`] | Capture UI a client shows for missing fields |
//! | [`OutboundEvent`] | Event streamed to the client during a turn |
//! | [`ModelEvent`] | Event streamed by the model collaborator |
//!
//! ## Example
//!
//! ```rust
//! use ai_assist_rust::types::{Affordance, MissingFields, ToolResult};
//! use serde_json::json;
//!
//! let result = ToolResult::incomplete(
//!     json!({"customerId": "CREDIT-001"}),
//!     MissingFields::one("creditStatus"),
//!     Affordance::CreditStatusForm,
//!     "查询授信客户信息需补充授信状态",
//! );
//! assert_eq!(result.missing_fields(), &["creditStatus".to_string()][..]);
//! ```

pub mod events;
pub mod message;
pub mod tool;

pub use events::{ErrorKind, ModelEvent, OutboundEvent};
pub use message::{Message, MessagePart, MessageRole};
pub use tool::{Affordance, FunctionDescriptor, MissingFields, ToolCall, ToolDescriptor, ToolResult};
