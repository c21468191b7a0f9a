//! 模型协作者：将对话历史与可用工具转换为模型事件流
//!
//! Language-model collaborators.
//!
//! The orchestrator only sees [`LanguageModel`]: given the history so far and
//! the descriptors of the tools allowed for this turn, produce a stream of
//! [`ModelEvent`]s. Three implementations ship with the crate:
//!
//! - [`OpenAiCompatModel`]: streaming chat-completions over HTTP (DeepSeek by default)
//! - [`RuleBasedModel`]: offline keyword model, used by the CLI without an API key
//! - [`ScriptedModel`]: deterministic double for tests and benches

pub mod assembler;
pub mod openai_compat;
pub mod rules;
pub mod scripted;
pub mod sse;

pub use assembler::ToolCallAssembler;
pub use openai_compat::OpenAiCompatModel;
pub use rules::RuleBasedModel;
pub use scripted::{Script, ScriptedModel};

use crate::types::{Message, MessageRole, ModelEvent, ToolCall, ToolDescriptor, ToolResult};
use crate::{BoxStream, Result};
use async_trait::async_trait;

/// Input to one model invocation.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Prior history plus whatever the current turn has produced so far.
    pub history: Vec<Message>,
    /// Tools the model may call in this turn.
    pub tools: Vec<ToolDescriptor>,
}

impl ModelRequest {
    pub fn new(history: Vec<Message>, tools: Vec<ToolDescriptor>) -> Self {
        Self { history, tools }
    }

    pub fn offers(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t.name() == tool)
    }

    /// Text of the most recent user message.
    pub fn last_user_text(&self) -> Option<String> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(Message::text)
    }

    /// Tool invocations of the trailing assistant message, i.e. the results the
    /// current turn has folded back into context.
    pub fn trailing_invocations(&self) -> Vec<(&ToolCall, Option<&ToolResult>)> {
        match self.history.last() {
            Some(m) if m.role == MessageRole::Assistant => m.tool_invocations().collect(),
            _ => Vec::new(),
        }
    }
}

/// Streaming language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start one generation. Errors before the first event are returned
    /// directly; errors mid-stream arrive as `Err` items.
    async fn generate(&self, request: ModelRequest) -> Result<BoxStream<'static, ModelEvent>>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
