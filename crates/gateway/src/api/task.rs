use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use sentinel_sessions::compute_source_key;

use crate::channel::{ChannelRouter, IncomingMessage, OutgoingMessage};
use crate::state::AppState;

const MAX_REQUEST_CHARS: usize = 50_000;
const MIN_REQUEST_CHARS: usize = 3;

#[derive(Debug, Deserialize)]
pub struct SubmitTaskBody {
    pub request: String,
    #[serde(default)]
    pub approval_mode: Option<String>,
}

/// Trim, collapse runs of 3+ newlines to 2, and enforce the length bounds
/// spec.md §6 names. Full Unicode NFC normalization is not applied — no
/// normalization crate is part of this workspace's dependency stack, and
/// the trim/collapse/length checks are the load-bearing ones for the
/// scanners downstream.
fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut newline_run = 0;
    for ch in trimmed.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(ch);
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out
}

fn validation_error(reason: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "reason": reason}))).into_response()
}

/// No-op outbound sink: the HTTP channel is one-shot, it awaits the
/// task's final result directly rather than streaming progress events.
struct NullSink;

impl crate::channel::OutboundSink for NullSink {
    fn send(&self, _message: OutgoingMessage) {}
}

pub async fn submit_task(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<SubmitTaskBody>,
) -> Response {
    let normalized = normalize(&body.request);
    if normalized.is_empty() || normalized.chars().count() < MIN_REQUEST_CHARS {
        return validation_error("request is too short");
    }
    if normalized.chars().count() > MAX_REQUEST_CHARS {
        return validation_error("request exceeds max length");
    }

    let source_key = compute_source_key("http", &addr.ip().to_string());
    let router = ChannelRouter::new(state.orchestrator.clone(), state.bus.clone());
    let message = IncomingMessage {
        request: normalized,
        approval_mode: body.approval_mode.unwrap_or_else(|| "auto".into()),
    };

    let result_json = router.handle_message("http", &source_key, message, Arc::new(NullSink)).await;
    let value: serde_json::Value = serde_json::from_str(&result_json).unwrap_or(json!({"status": "error"}));
    (StatusCode::OK, Json(value)).into_response()
}
