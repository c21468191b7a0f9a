//! Deterministic model double.

use super::{LanguageModel, ModelRequest};
use crate::error::ErrorContext;
use crate::types::ModelEvent;
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Events for one invocation, optionally ending in a stream failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub events: Vec<ModelEvent>,
    pub fail_with: Option<String>,
}

impl Script {
    pub fn new(events: Vec<ModelEvent>) -> Self {
        Self {
            events,
            fail_with: None,
        }
    }

    /// Emit the events, then fail the stream with `message`.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }
}

impl From<Vec<ModelEvent>> for Script {
    fn from(events: Vec<ModelEvent>) -> Self {
        Script::new(events)
    }
}

type ScriptFn = dyn Fn(&ModelRequest, usize) -> Script + Send + Sync;

/// Model whose output is computed by a closure over the request and the
/// zero-based invocation index.
#[derive(Clone)]
pub struct ScriptedModel {
    script: Arc<ScriptFn>,
    event_delay: Option<Duration>,
    invocations: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(&ModelRequest, usize) -> Script + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            event_delay: None,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Play `steps` in order, one per invocation; later invocations produce
    /// an empty reply.
    pub fn sequence(steps: Vec<Script>) -> Self {
        Self::from_fn(move |_, step| steps.get(step).cloned().unwrap_or_default())
    }

    /// Sleep before every event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// Number of times `generate` was called.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: ModelRequest) -> Result<BoxStream<'static, ModelEvent>> {
        let step = self.invocations.fetch_add(1, Ordering::SeqCst);
        let Script { events, fail_with } = (self.script)(&request, step);

        let failure = fail_with.map(|message| {
            Err(Error::model_with_context(
                message,
                ErrorContext::new().with_source("scripted"),
            ))
        });
        let items = events
            .into_iter()
            .map(Ok)
            .chain(failure)
            .collect::<Vec<Result<ModelEvent>>>();

        let delay = self.event_delay;
        let stream = stream::iter(items).then(move |item| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn sequence_advances_per_invocation() {
        let model = ScriptedModel::sequence(vec![
            vec![ModelEvent::text("first")].into(),
            vec![ModelEvent::text("second")].into(),
        ]);
        for expected in ["first", "second"] {
            let events: Vec<_> = model
                .generate(ModelRequest::default())
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap();
            assert_eq!(events, vec![ModelEvent::text(expected)]);
        }
        let tail: Vec<_> = model
            .generate(ModelRequest::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(tail.is_empty());
        assert_eq!(model.invocations(), 3);
    }

    #[tokio::test]
    async fn failure_follows_events() {
        let model = ScriptedModel::sequence(vec![
            Script::new(vec![ModelEvent::text("partial")]).then_fail("connection reset"),
        ]);
        let mut stream = model.generate(ModelRequest::default()).await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(_))));
        assert!(matches!(stream.next().await, Some(Err(Error::Model { .. }))));
        assert!(stream.next().await.is_none());
    }
}
