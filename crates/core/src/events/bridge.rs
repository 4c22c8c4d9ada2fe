//! WebSocket fan-out bridge: forwards every bus event to the
//! per-`run_id` set of outbound channels a websocket layer (external to
//! this crate) drains from. Dead channels are reaped on the next
//! broadcast rather than eagerly, mirroring the teacher's writer-task
//! pattern where a closed receiver is only discovered on send.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{EventBusError, EventHandler, WorkflowEvent};

const CHANNEL_CAPACITY: usize = 64;

/// Registers one outbound channel per connected client per `run_id` and
/// forwards every [`WorkflowEvent`] for that run to all of them.
#[derive(Default)]
pub struct WebSocketBridge {
    connections: DashMap<Uuid, Vec<mpsc::Sender<WorkflowEvent>>>,
}

impl WebSocketBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `run_id`'s events; the returned
    /// receiver is what the WebSocket write loop drains.
    pub fn register(&self, run_id: Uuid) -> mpsc::Receiver<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.connections.entry(run_id).or_default().push(tx);
        rx
    }

    pub fn connection_count(&self, run_id: Uuid) -> usize {
        self.connections.get(&run_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl EventHandler for WebSocketBridge {
    async fn handle(&self, event: &WorkflowEvent) -> Result<(), EventBusError> {
        let Some(mut entry) = self.connections.get_mut(&event.run_id) else {
            return Ok(());
        };
        entry.retain(|tx| tx.try_send(event.clone()).is_ok());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::Value;

    #[tokio::test]
    async fn forwards_events_to_registered_run() {
        let bridge = WebSocketBridge::new();
        let run_id = Uuid::new_v4();
        let mut rx = bridge.register(run_id);

        let event = WorkflowEvent::new(run_id, EventKind::StepStarted, Some("ranking"), Value::Null);
        bridge.handle(&event).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id, run_id);
    }

    #[tokio::test]
    async fn ignores_events_for_unregistered_run() {
        let bridge = WebSocketBridge::new();
        let event = WorkflowEvent::new(Uuid::new_v4(), EventKind::StepStarted, None, Value::Null);
        assert!(bridge.handle(&event).await.is_ok());
    }

    #[tokio::test]
    async fn drops_dead_connection_on_next_broadcast() {
        let bridge = WebSocketBridge::new();
        let run_id = Uuid::new_v4();
        let rx = bridge.register(run_id);
        drop(rx);

        let event = WorkflowEvent::new(run_id, EventKind::StepStarted, None, Value::Null);
        bridge.handle(&event).await.unwrap();

        assert_eq!(bridge.connection_count(run_id), 0);
    }
}
