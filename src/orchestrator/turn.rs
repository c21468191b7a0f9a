//! The per-turn loop.
//!
//! One model step streams model events and dispatches every requested tool
//! call as soon as it appears; sibling calls run concurrently on the runtime
//! and the step only ends once the model stream is closed and every call has
//! resolved. The step outcome then decides whether the turn is folded back
//! into the model, finalized, or failed.

use super::conversation::Conversation;
use super::state::TurnState;
use crate::executor::{ToolError, ToolExecutor};
use crate::model::{LanguageModel, ModelRequest};
use crate::registry::ToolRegistry;
use crate::types::{ErrorKind, Message, ModelEvent, OutboundEvent, ToolCall, ToolDescriptor, ToolResult};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, warn, Instrument};

/// Why a turn stopped before `TurnDone`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stop {
    Failed { kind: ErrorKind, detail: String },
    /// The event receiver is gone; nobody is listening any more.
    Disconnected,
}

impl Stop {
    pub(crate) fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Stop::Failed {
            kind,
            detail: detail.into(),
        }
    }
}

type Resolution = (String, std::result::Result<std::result::Result<ToolResult, ToolError>, JoinError>);

#[derive(Debug, Default)]
struct StepOutcome {
    dispatched: usize,
    completed: usize,
    incomplete: usize,
    /// InvalidInput, UnknownTool, and ToolNotAllowed failures
    rejected: usize,
    execution_failures: Vec<String>,
}

pub(crate) struct Turn {
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) model: Arc<dyn LanguageModel>,
    pub(crate) executor: ToolExecutor,
    pub(crate) allowed: HashSet<String>,
    pub(crate) descriptors: Vec<ToolDescriptor>,
    pub(crate) max_model_steps: usize,
    pub(crate) conversation: Conversation,
    pub(crate) events: mpsc::Sender<OutboundEvent>,
    pub(crate) state: TurnState,
    pub(crate) seen_ids: HashSet<String>,
}

impl Turn {
    /// Drive the turn to completion and return the final history.
    /// Terminal events are emitted by the caller.
    pub(crate) async fn run(mut self) -> Result<Vec<Message>, Stop> {
        let mut steps = 0usize;
        loop {
            if steps >= self.max_model_steps {
                self.transition(TurnState::Failed);
                return Err(Stop::failed(
                    ErrorKind::StepLimit,
                    format!("model still requesting tools after {} steps", steps),
                ));
            }
            steps += 1;
            self.transition(TurnState::ModelGenerating);

            let outcome = match self.model_step(steps).await {
                Ok(outcome) => outcome,
                Err(stop) => {
                    self.transition(TurnState::Failed);
                    return Err(stop);
                }
            };
            debug!(step = steps, dispatched = outcome.dispatched, ?outcome, "model step finished");

            if !outcome.execution_failures.is_empty() {
                self.transition(TurnState::Failed);
                return Err(Stop::failed(
                    ErrorKind::ToolExecution,
                    outcome.execution_failures.join("; "),
                ));
            }

            // Rejected calls stay in context as error parts beside completed siblings.
            let fold_back = outcome.completed > 0 && outcome.incomplete == 0;
            if !fold_back {
                self.transition(TurnState::Finalizing);
                self.transition(TurnState::Done);
                let history = self.conversation.finish();
                info!(
                    steps,
                    messages = history.len(),
                    incomplete = outcome.incomplete,
                    "turn finished"
                );
                return Ok(history);
            }
        }
    }

    async fn model_step(&mut self, step: usize) -> Result<StepOutcome, Stop> {
        let request = ModelRequest::new(self.conversation.context(), self.descriptors.clone());
        let mut stream = self.model.generate(request).await.map_err(|e| {
            warn!(model = self.model.name(), error = %e, "model stream failed to open");
            Stop::failed(ErrorKind::ModelStream, e.to_string())
        })?;

        let mut in_flight: FuturesUnordered<BoxFuture<'static, Resolution>> = FuturesUnordered::new();
        let mut outcome = StepOutcome::default();
        let mut model_open = true;

        loop {
            tokio::select! {
                next = stream.next(), if model_open => match next {
                    Some(Ok(ModelEvent::TextDelta { content })) => {
                        if !content.is_empty() {
                            self.conversation.push_text(&content);
                            self.emit(OutboundEvent::TextDelta { content }).await?;
                        }
                    }
                    Some(Ok(ModelEvent::ToolCallRequested { id, name, input })) => {
                        if let Some(task) = self.accept_call(id, name, input, &mut outcome).await? {
                            in_flight.push(task);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(step, error = %e, "model stream failed");
                        return Err(Stop::failed(ErrorKind::ModelStream, e.to_string()));
                    }
                    None => {
                        debug!(step, pending = self.conversation.pending_count(), "model stream closed");
                        model_open = false;
                    }
                },
                Some((id, joined)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.settle(id, joined, &mut outcome).await?;
                }
                else => break,
            }
        }
        Ok(outcome)
    }

    /// Record the call, then either reject it or hand it to the executor.
    async fn accept_call(
        &mut self,
        id: Option<String>,
        name: String,
        input: Value,
        outcome: &mut StepOutcome,
    ) -> Result<Option<BoxFuture<'static, Resolution>>, Stop> {
        let id = self.call_id(id);
        self.conversation
            .push_call(ToolCall::new(id.clone(), name.clone(), input.clone()));
        self.emit(OutboundEvent::ToolCallStarted {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        })
        .await?;

        let rejection = if !self.registry.contains(&name) {
            Some((ErrorKind::UnknownTool, format!("no tool named '{}' is registered", name)))
        } else if !self.allowed.contains(&name) {
            Some((
                ErrorKind::ToolNotAllowed,
                format!("tool '{}' is not allowed in this turn", name),
            ))
        } else {
            None
        };
        if let Some((kind, detail)) = rejection {
            warn!(id = %id, tool = %name, %kind, "tool call rejected");
            outcome.rejected += 1;
            self.conversation.fail(&id, kind, detail.clone());
            self.emit(OutboundEvent::ToolCallFailed { id, kind, detail }).await?;
            return Ok(None);
        }

        let definition = self
            .registry
            .resolve(&name)
            .map_err(|e| Stop::failed(ErrorKind::UnknownTool, e.to_string()))?;
        outcome.dispatched += 1;
        self.transition(TurnState::ToolPending);
        info!(id = %id, tool = %name, "dispatching tool call");

        let executor = self.executor;
        let span = tracing::debug_span!("tool", id = %id, tool = %name);
        // Detached: a dropped turn leaves the task running and its result unread.
        let handle = tokio::spawn(
            async move { executor.execute(&definition, input).await }.instrument(span),
        );
        Ok(Some(async move { (id, handle.await) }.boxed()))
    }

    async fn settle(
        &mut self,
        id: String,
        joined: std::result::Result<std::result::Result<ToolResult, ToolError>, JoinError>,
        outcome: &mut StepOutcome,
    ) -> Result<(), Stop> {
        let failure = match joined {
            Ok(Ok(result)) => {
                if result.is_incomplete() {
                    outcome.incomplete += 1;
                } else {
                    outcome.completed += 1;
                }
                debug!(id = %id, incomplete = result.is_incomplete(), "tool call resolved");
                self.conversation.resolve(&id, result.clone());
                return self.emit(OutboundEvent::ToolCallResolved { id, result }).await;
            }
            Ok(Err(e @ ToolError::InvalidInput { .. })) => {
                outcome.rejected += 1;
                (ErrorKind::InvalidInput, e.to_string())
            }
            Ok(Err(e @ ToolError::Execution { .. })) => {
                outcome.execution_failures.push(e.to_string());
                (ErrorKind::ToolExecution, e.to_string())
            }
            Err(join) => {
                let detail = if join.is_panic() {
                    "tool task panicked".to_string()
                } else {
                    format!("tool task aborted: {}", join)
                };
                outcome.execution_failures.push(detail.clone());
                (ErrorKind::ToolExecution, detail)
            }
        };

        let (kind, detail) = failure;
        warn!(id = %id, %kind, %detail, "tool call failed");
        self.conversation.fail(&id, kind, detail.clone());
        self.emit(OutboundEvent::ToolCallFailed { id, kind, detail }).await
    }

    /// Keep the model's id when it is usable, otherwise mint one.
    fn call_id(&mut self, proposed: Option<String>) -> String {
        let id = match proposed {
            Some(id) if !id.is_empty() && !self.seen_ids.contains(&id) => id,
            Some(dup) if !dup.is_empty() => {
                warn!(id = %dup, "model reused a call id; assigning a fresh one");
                fresh_call_id()
            }
            _ => fresh_call_id(),
        };
        self.seen_ids.insert(id.clone());
        id
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), Stop> {
        self.events.send(event).await.map_err(|_| {
            debug!("event receiver dropped; abandoning turn");
            Stop::Disconnected
        })
    }

    fn transition(&mut self, next: TurnState) {
        if self.state == next && next != TurnState::ToolPending {
            return;
        }
        if self.state.is_terminal() {
            warn!(from = %self.state, to = %next, "transition after turn ended");
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "unexpected turn state transition");
        }
        debug!(from = %self.state, to = %next, "turn state");
        self.state = next;
    }
}

fn fresh_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}
