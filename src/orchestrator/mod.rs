//! 对话编排器：每个请求一个状态机，交错输出模型文本与工具结果
//!
//! Conversation orchestrator.
//!
//! [`Orchestrator::submit_turn`] takes the client's history and the allow-list
//! for this turn, spawns the turn on the runtime, and returns a
//! [`TurnStream`] of [`OutboundEvent`]s. Every stream ends with exactly one
//! terminal event: `TurnDone` carrying the new authoritative history, or
//! `TurnError`.
//!
//! The registry and model are shared read-only between turns; everything
//! else (conversation, pending calls, state) belongs to one turn.

pub mod cancel;
pub mod conversation;
pub mod state;
mod turn;

pub use cancel::CancelHandle;
pub use conversation::Conversation;
pub use state::TurnState;

use crate::error::ErrorContext;
use crate::executor::ToolExecutor;
use crate::model::LanguageModel;
use crate::registry::ToolRegistry;
use crate::types::{ErrorKind, Message, MessageRole, OutboundEvent};
use crate::{Error, Result};
use futures::{stream, Stream};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, Instrument};
use turn::{Stop, Turn};

/// Client-facing event stream of one turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = OutboundEvent> + Send + 'static>>;

/// Per-turn limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnConfig {
    /// Wall-clock budget for the whole turn, pending tool calls included.
    pub turn_timeout: Duration,
    /// Model invocations allowed in one turn.
    pub max_model_steps: usize,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(30),
            max_model_steps: 5,
            event_buffer: 64,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn LanguageModel>,
    executor: ToolExecutor,
    config: TurnConfig,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Start a turn. Fails before anything is streamed when the history is
    /// empty, does not end with a user message, or the allow-list names an
    /// unregistered tool.
    pub fn submit_turn<S: AsRef<str>>(
        &self,
        history: Vec<Message>,
        allowed_tools: &[S],
    ) -> Result<TurnStream> {
        let (stream, _cancel) = self.submit_turn_with_cancel(history, allowed_tools)?;
        Ok(stream)
    }

    /// Like [`Orchestrator::submit_turn`], plus a handle that cancels the turn.
    pub fn submit_turn_with_cancel<S: AsRef<str>>(
        &self,
        history: Vec<Message>,
        allowed_tools: &[S],
    ) -> Result<(TurnStream, CancelHandle)> {
        check_history(&history)?;
        let descriptors = self.registry.descriptors_for(allowed_tools)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::runtime_with_context(
                "turns must be submitted from within a tokio runtime",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("orchestrator"),
            )
        })?;
        let allowed: HashSet<String> = allowed_tools
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        let turn_id = uuid::Uuid::new_v4().simple().to_string();
        if let Some(resumes) = history.last().and_then(|m| m.resumes.as_deref()) {
            info!(turn_id = %turn_id, resumes, "turn answers an incomplete tool call");
        }

        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (cancel_handle, cancel) = cancel::cancel_pair();

        let turn = Turn {
            registry: Arc::clone(&self.registry),
            model: Arc::clone(&self.model),
            executor: self.executor,
            allowed,
            descriptors,
            max_model_steps: self.config.max_model_steps,
            conversation: Conversation::new(history),
            events: tx.clone(),
            state: TurnState::Idle,
            seen_ids: HashSet::new(),
        };

        let budget = self.config.turn_timeout;
        let span = tracing::info_span!("turn", turn_id = %turn_id, model = self.model.name());
        runtime.spawn(
            async move {
                info!(tools = turn.allowed.len(), "turn started");
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Stop::failed(ErrorKind::Cancelled, "turn cancelled by client")),
                    finished = tokio::time::timeout(budget, turn.run()) => match finished {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Stop::failed(
                            ErrorKind::Timeout,
                            format!("turn exceeded its {} ms budget", budget.as_millis()),
                        )),
                    },
                };

                let terminal = match outcome {
                    Ok(final_history) => OutboundEvent::TurnDone { final_history },
                    Err(Stop::Failed { kind, detail }) => {
                        info!(%kind, %detail, "turn failed");
                        OutboundEvent::TurnError { kind, detail }
                    }
                    Err(Stop::Disconnected) => return,
                };
                if tx.send(terminal).await.is_err() {
                    debug!("client gone before the terminal event");
                }
            }
            .instrument(span),
        );

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok((Box::pin(events), cancel_handle))
    }
}

fn check_history(history: &[Message]) -> Result<()> {
    match history.last() {
        None => Err(Error::validation_with_context(
            "history must contain at least one message",
            ErrorContext::new().with_field_path("history"),
        )),
        Some(last) if last.role != MessageRole::User => Err(Error::validation_with_context(
            "the last message of a turn must come from the user",
            ErrorContext::new().with_field_path(format!("history[{}].role", history.len() - 1)),
        )),
        Some(_) => Ok(()),
    }
}

pub struct OrchestratorBuilder {
    registry: Option<Arc<ToolRegistry>>,
    model: Option<Arc<dyn LanguageModel>>,
    config: TurnConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            model: None,
            config: TurnConfig::default(),
        }
    }

    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Share one registry between several orchestrators.
    pub fn shared_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn model<M: LanguageModel + 'static>(mut self, model: M) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn shared_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn turn_timeout(mut self, timeout: Duration) -> Self {
        self.config.turn_timeout = timeout;
        self
    }

    pub fn max_model_steps(mut self, steps: usize) -> Self {
        self.config.max_model_steps = steps;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let registry = self.registry.ok_or_else(|| {
            Error::configuration_with_context(
                "orchestrator needs a tool registry",
                ErrorContext::new().with_source("orchestrator_builder"),
            )
        })?;
        let model = self.model.ok_or_else(|| {
            Error::configuration_with_context(
                "orchestrator needs a language model",
                ErrorContext::new().with_source("orchestrator_builder"),
            )
        })?;
        if self.config.max_model_steps == 0 || self.config.turn_timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "turn limits must be positive",
                ErrorContext::new()
                    .with_source("orchestrator_builder")
                    .with_details(format!("{:?}", self.config)),
            ));
        }
        Ok(Orchestrator {
            registry,
            model,
            executor: ToolExecutor::new(),
            config: self.config,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use crate::tools::builtin_registry;

    fn orchestrator() -> Orchestrator {
        Orchestrator::builder()
            .registry(builtin_registry().unwrap())
            .model(ScriptedModel::sequence(vec![]))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_history_is_rejected() {
        let err = orchestrator()
            .submit_turn(Vec::new(), &["weather"])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn history_must_end_with_user() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let err = orchestrator().submit_turn(history, &["weather"]).err().unwrap();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("history[1].role")
        );
    }

    #[test]
    fn submitting_outside_a_runtime_is_an_error() {
        let err = orchestrator()
            .submit_turn(vec![Message::user("hi")], &["weather"])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Runtime { .. }));
        assert_eq!(
            err.context().and_then(|c| c.source.as_deref()),
            Some("orchestrator")
        );
    }

    #[tokio::test]
    async fn unknown_allow_list_entry_is_a_registry_error() {
        let err = orchestrator()
            .submit_turn(vec![Message::user("hi")], &["weather", "calendar"])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn builder_requires_model() {
        let err = Orchestrator::builder()
            .registry(ToolRegistry::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
