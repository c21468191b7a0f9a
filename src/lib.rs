//! # ai-assist-rust
//!
//! 面向流式对话助手的工具调用运行时，支持"信息不完整"补全往返协议。
//!
//! Tool-calling conversation runtime for streaming assistants.
//!
//! ## Overview
//!
//! A client submits its message history; the orchestrator invokes a language
//! model with the tools allowed for that turn, runs the tool calls the model
//! requests (concurrently, with schema validation), folds results back into
//! the model's context, and streams text and tool results to the client as
//! [`OutboundEvent`]s.
//!
//! A tool may answer `Incomplete` instead of failing: the call was well
//! formed, but a business rule needs a field the model could not supply. The
//! turn then ends, the client collects the missing value through the named
//! [`Affordance`], and resubmits a restated request as a fresh turn. No state
//! is kept server-side in between; see [`completion`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_assist_rust::{builtin_registry, Message, Orchestrator, RuleBasedModel};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> ai_assist_rust::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .registry(builtin_registry()?)
//!         .model(RuleBasedModel::new())
//!         .build()?;
//!
//!     let history = vec![Message::user("查询客户CREDIT-001")];
//!     let mut events = orchestrator.submit_turn(history, &["customer"])?;
//!     while let Some(event) = events.next().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Messages, tool calls and results, stream events |
//! | [`schema`] | JSON Schema input validation with defaults |
//! | [`registry`] | Name-keyed tool definitions |
//! | [`executor`] | Validation plus execution of one tool call |
//! | [`orchestrator`] | Per-turn state machine and event stream |
//! | [`completion`] | Completion-request protocol for incomplete results |
//! | [`model`] | Language-model collaborators |
//! | [`transport`] | HTTP transport for remote models |
//! | [`tools`] | Built-in weather, QR-code and customer tools |
//! | [`render`] | Client-side transcript |
//! | [`config`] | YAML + environment configuration |

pub mod completion;
pub mod config;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod schema;
pub mod tools;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use completion::{CompletionError, CompletionRequest};
pub use config::{ModelConfig, RuntimeConfig};
pub use executor::{ToolError, ToolExecutor};
pub use model::{LanguageModel, ModelRequest, OpenAiCompatModel, RuleBasedModel, ScriptedModel};
pub use orchestrator::{CancelHandle, Orchestrator, OrchestratorBuilder, TurnConfig, TurnStream};
pub use registry::{RegistryError, ToolDefinition, ToolHandler, ToolRegistry};
pub use render::Transcript;
pub use tools::{builtin_registry, BuiltinTool};
pub use types::{
    Affordance, ErrorKind, Message, MessagePart, MessageRole, MissingFields, ModelEvent,
    OutboundEvent, ToolCall, ToolResult,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
