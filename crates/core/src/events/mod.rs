//! In-process async pub/sub event bus (§4.20).

pub mod bridge;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("handler failed: {0}")]
    Handler(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepStarted,
    StepCompleted,
    CheckpointReached,
    CheckpointResolved,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    pub run_id: Uuid,
    pub kind: EventKind,
    pub step: Option<String>,
    pub detail: Value,
    pub emitted_at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(run_id: Uuid, kind: EventKind, step: Option<&str>, detail: Value) -> Self {
        Self { run_id, kind, step: step.map(str::to_string), detail, emitted_at: Utc::now() }
    }
}

#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WorkflowEvent) -> Result<(), EventBusError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Concurrent in-process pub/sub: `emit` dispatches to every subscribed
/// handler at once and waits for all of them, logging (never
/// propagating) individual handler failures.
#[derive(Default)]
pub struct EventBus {
    handlers: DashMap<HandlerId, std::sync::Arc<dyn EventHandler>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: std::sync::Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.insert(id, handler);
        id
    }

    pub fn unsubscribe(&self, id: HandlerId) {
        self.handlers.remove(&id);
    }

    pub async fn emit(&self, event: WorkflowEvent) {
        let mut set = tokio::task::JoinSet::new();
        for entry in self.handlers.iter() {
            let handler = entry.value().clone();
            let event = event.clone();
            set.spawn(async move {
                if let Err(e) = handler.handle(&event).await {
                    warn!(error = %e, "event handler failed");
                }
            });
        }
        while set.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    struct CountingHandler(Arc<AtomicUsize>);
    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &WorkflowEvent) -> Result<(), EventBusError> {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;
    #[async_trait::async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &WorkflowEvent) -> Result<(), EventBusError> {
            Err(EventBusError::Handler("boom".into()))
        }
    }

    #[tokio::test]
    async fn emits_to_all_subscribed_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingHandler(count.clone())));
        bus.subscribe(Arc::new(CountingHandler(count.clone())));

        bus.emit(WorkflowEvent::new(Uuid::new_v4(), EventKind::StepStarted, Some("ranking"), Value::Null)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_failure_does_not_propagate_or_block_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(FailingHandler));
        bus.subscribe(Arc::new(CountingHandler(count.clone())));

        bus.emit(WorkflowEvent::new(Uuid::new_v4(), EventKind::WorkflowFailed, None, Value::Null)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe(Arc::new(CountingHandler(count.clone())));
        bus.unsubscribe(id);

        bus.emit(WorkflowEvent::new(Uuid::new_v4(), EventKind::StepCompleted, None, Value::Null)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);
    }
}
