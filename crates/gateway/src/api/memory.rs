//! Memory CRUD surface. The vector/FTS5 memory subsystem itself is out of
//! scope for this core (spec.md §1) — these routes exist so a caller gets
//! a typed, structured answer instead of a bare 404, with the interface
//! the orchestrator would eventually consume left as the seam.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

fn not_implemented() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({"status": "error", "reason": "memory subsystem is not part of this core"})),
    )
        .into_response()
}

pub async fn store_memory() -> Response {
    not_implemented()
}

pub async fn search_memory() -> Response {
    not_implemented()
}

pub async fn get_memory() -> Response {
    not_implemented()
}

pub async fn delete_memory() -> Response {
    not_implemented()
}
