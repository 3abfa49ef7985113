use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "routines": state.routines.list().len(),
        "bus_subscribers": state.bus.subscriber_count().await,
    }))
}
