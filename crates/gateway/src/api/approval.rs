use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

pub async fn get_approval(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.approval.get_pending(&id) {
        Some(pending) => (StatusCode::OK, Json(json!({"status": pending.status}))).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"status": "error", "reason": "approval not found"}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitApprovalBody {
    pub granted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn submit_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitApprovalBody>,
) -> Response {
    use sentinel_approval::SubmitOutcome;

    match state.approval.submit_approval(id, body.granted, body.reason) {
        SubmitOutcome::Accepted => {
            let result = state.orchestrator.execute_approved_plan(id).await;
            (StatusCode::OK, Json(serde_json::to_value(result).unwrap())).into_response()
        }
        SubmitOutcome::NotFound | SubmitOutcome::AlreadyDecided | SubmitOutcome::Expired => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "reason": "invalid, expired, or duplicate"})),
        )
            .into_response(),
    }
}
