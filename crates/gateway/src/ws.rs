//! WebSocket channel: `GET /ws`. Authenticates in-band — the first frame
//! must be `{"type":"auth","pin":"..."}` — since browser WS clients can't
//! set a custom header during the handshake. Wrong/missing PIN closes
//! with code 4001. After auth, frames are `{type:"task",...}` or
//! `{type:"approval",...}` per spec.md §6.
//!
//! Grounded on the teacher's node WebSocket handler
//! (`nodes/ws.rs`): split sink/stream, a writer task draining an mpsc
//! channel, a reader loop dispatching inbound frames.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::pin_matches;
use crate::channel::{ChannelRouter, IncomingMessage, OutboundSink, OutgoingMessage};
use crate::state::AppState;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InboundFrame {
    Auth {
        pin: String,
    },
    Task {
        request: String,
        #[serde(default = "default_approval_mode")]
        approval_mode: String,
    },
    Approval {
        approval_id: Uuid,
        granted: bool,
        #[serde(default)]
        reason: Option<String>,
    },
}

fn default_approval_mode() -> String {
    "auto".into()
}

struct MpscSink(mpsc::Sender<OutgoingMessage>);

impl OutboundSink for MpscSink {
    fn send(&self, message: OutgoingMessage) {
        let _ = self.0.try_send(message);
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    if let Some(expected) = &state.pin_hash {
        let authed = match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Auth { pin }) => pin_matches(expected, &pin),
                _ => false,
            },
            _ => false,
        };
        if !authed {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: 4001,
                    reason: "invalid or missing PIN".into(),
                })))
                .await;
            return;
        }
    }

    let (out_tx, mut out_rx) = mpsc::channel::<OutgoingMessage>(64);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let router = ChannelRouter::new(state.orchestrator.clone(), state.bus.clone());
    let peer = Uuid::new_v4().to_string();
    let source_key = sentinel_sessions::compute_source_key("websocket", &peer);
    let out_tx = Arc::new(out_tx);

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<InboundFrame>(&text) {
                    Ok(f) => f,
                    Err(_) => {
                        let _ = out_tx.try_send(OutgoingMessage {
                            event_type: "error".into(),
                            data: json!({"reason": "unparseable frame"}),
                            timestamp: chrono::Utc::now(),
                        });
                        continue;
                    }
                };
                match frame {
                    InboundFrame::Auth { .. } => {}
                    InboundFrame::Task { request, approval_mode } => {
                        let sink: Arc<dyn OutboundSink> = Arc::new(MpscSink((*out_tx).clone()));
                        router
                            .handle_message(
                                "websocket",
                                &source_key,
                                IncomingMessage { request, approval_mode },
                                sink,
                            )
                            .await;
                    }
                    InboundFrame::Approval { approval_id, granted, reason } => {
                        use sentinel_approval::SubmitOutcome;
                        let outcome = state.approval.submit_approval(approval_id, granted, reason);
                        let payload = match outcome {
                            SubmitOutcome::Accepted => {
                                let result = state.orchestrator.execute_approved_plan(approval_id).await;
                                serde_json::to_value(result).unwrap_or(json!({}))
                            }
                            SubmitOutcome::NotFound | SubmitOutcome::AlreadyDecided | SubmitOutcome::Expired => {
                                json!({"status": "error", "reason": "invalid, expired, or duplicate"})
                            }
                        };
                        let _ = out_tx.try_send(OutgoingMessage {
                            event_type: "approval_result".into(),
                            data: payload,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
}
