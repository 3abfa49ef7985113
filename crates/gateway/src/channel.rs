//! Channel abstraction: every request source (HTTP, WebSocket, SSE,
//! messaging subprocess, MCP) is wired to the orchestrator the same way —
//! through `ChannelRouter::handle_message`, which never knows which
//! concrete channel it's forwarding events to.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sentinel_bus::EventBus;
use sentinel_orchestrator::Orchestrator;

/// `source_key` is deliberately absent from the wire shape — spec.md
/// §4.3 requires it be server-derived (channel tag + peer address), never
/// taken from the client. Callers attach it when invoking the router.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub request: String,
    #[serde(default = "default_approval_mode")]
    pub approval_mode: String,
}

fn default_approval_mode() -> String {
    "auto".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Anything that can push an `OutgoingMessage` back to a connected peer.
/// HTTP has no concept of a receive loop or a send-after-response, so it
/// never implements this — it awaits `handle_task` directly instead of
/// going through the router's event-forwarding path.
pub trait OutboundSink: Send + Sync {
    fn send(&self, message: OutgoingMessage);
}

/// Subscribes a forwarding handler to `task.<id>.*`, drives the task to
/// completion, and unsubscribes — the composition that streams live
/// progress to WebSocket/SSE/subprocess/MCP peers while the orchestrator
/// only ever talks to the bus.
pub struct ChannelRouter {
    orchestrator: Arc<Orchestrator>,
    bus: EventBus,
}

impl ChannelRouter {
    pub fn new(orchestrator: Arc<Orchestrator>, bus: EventBus) -> Self {
        Self { orchestrator, bus }
    }

    pub async fn handle_message(
        &self,
        source: &str,
        source_key: &str,
        message: IncomingMessage,
        sink: Arc<dyn OutboundSink>,
    ) -> String {
        let task_id = Uuid::new_v4().to_string();
        let pattern = format!("task.{task_id}.*");

        let forward_sink = sink.clone();
        let handle: sentinel_bus::Handler = Arc::new(move |topic: String, data: Value| {
            let sink = forward_sink.clone();
            Box::pin(async move {
                sink.send(OutgoingMessage { event_type: topic, data, timestamp: chrono::Utc::now() });
                Ok::<(), sentinel_bus::HandlerError>(())
            })
        });
        self.bus.subscribe(&pattern, handle.clone()).await;

        let result = self
            .orchestrator
            .handle_task(&message.request, source, &message.approval_mode, source_key, Some(task_id.clone()))
            .await;

        self.bus.unsubscribe(&pattern, &handle).await;

        serde_json::to_string(&result).unwrap_or_else(|_| task_id.clone())
    }
}
