//! 工具注册表：按名称保存工具定义，启动后只读
//!
//! Tool registry. Holds every tool the runtime can expose, keyed by unique name
//! and kept in registration order. It is populated once at startup and then
//! shared read-only (behind an `Arc`) by every turn, so no locking is needed.

use crate::schema::{InputSchema, SchemaError};
use crate::types::{ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Executable body of a tool.
///
/// Receives input that already passed schema validation (with defaults filled
/// in). Returning `Ok(ToolResult::Incomplete { .. })` asks the user for more
/// information; returning `Err` is a hard failure of the tool itself.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value) -> anyhow::Result<ToolResult>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnTool<F> {
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send,
{
    async fn call(&self, input: Value) -> anyhow::Result<ToolResult> {
        (self.func)(input).await
    }
}

/// A named, schema-described tool. Immutable once built.
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    schema: InputSchema,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self, SchemaError> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            schema: InputSchema::new(schema)?,
            handler,
        })
    }

    /// Build a definition from an async closure.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        func: F,
    ) -> Result<Self, SchemaError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
    {
        Self::new(name, description, schema, Arc::new(FnTool::new(func)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }

    /// Model-facing descriptor (name, description, JSON Schema parameters).
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(&self.name, &self.description, self.schema.raw().clone())
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Registry misuse. Fatal at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a tool named '{name}' is already registered")]
    DuplicateToolName { name: String },

    #[error("no tool named '{name}' is registered")]
    UnknownTool { name: String },
}

/// Name-keyed tool registry with stable registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<ToolDefinition>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), RegistryError> {
        if self.index.contains_key(definition.name()) {
            return Err(RegistryError::DuplicateToolName {
                name: definition.name().to_string(),
            });
        }
        tracing::debug!(tool = definition.name(), "registered tool");
        self.index
            .insert(definition.name().to_string(), self.tools.len());
        self.tools.push(Arc::new(definition));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, definition: ToolDefinition) -> Result<Self, RegistryError> {
        self.register(definition)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDefinition>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| RegistryError::UnknownTool {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All definitions in registration order.
    pub fn list_all(&self) -> &[Arc<ToolDefinition>] {
        &self.tools
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors for the allowed subset, in registration order.
    ///
    /// Fails on the first allow-list entry that is not registered.
    pub fn descriptors_for<S: AsRef<str>>(
        &self,
        allowed: &[S],
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        for name in allowed {
            if !self.contains(name.as_ref()) {
                return Err(RegistryError::UnknownTool {
                    name: name.as_ref().to_string(),
                });
            }
        }
        Ok(self
            .tools
            .iter()
            .filter(|t| allowed.iter().any(|a| a.as_ref() == t.name()))
            .map(|t| t.descriptor())
            .collect())
    }
}
