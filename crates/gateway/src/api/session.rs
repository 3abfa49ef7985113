use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// Debug endpoint. `source_key` is the session's natural key (`channel:peer`),
/// URL-encoded by the caller.
pub async fn get_session(State(state): State<AppState>, Path(source_key): Path<String>) -> Response {
    match state.sessions.get(&source_key) {
        Some(session) => (StatusCode::OK, Json(json!({
            "session_id": session.session_id,
            "source_key": session.source_key,
            "turn_count": session.turns.len(),
            "cumulative_risk": session.cumulative_risk,
            "violation_count": session.violation_count,
            "is_locked": session.is_locked,
            "created_at": session.created_at,
            "last_active": session.last_active,
        })))
            .into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"status": "error", "reason": "session not found"}))).into_response(),
    }
}
