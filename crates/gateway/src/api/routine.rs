use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use sentinel_domain::data::{ActionConfig, ExecutionStatus, Routine, RoutineExecution, TriggerType};
use sentinel_routines::{validate_trigger_config, TaskHandler};
use sentinel_sessions::routine_source_key;

use crate::state::AppState;

pub async fn list_routines(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(json!({"routines": state.routines.list()}))).into_response()
}

pub async fn get_routine(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.routines.get(&id) {
        Some(routine) => (StatusCode::OK, Json(serde_json::to_value(routine).unwrap())).into_response(),
        None => not_found(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRoutineBody {
    pub user_id: String,
    pub name: String,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Value,
    pub action_config: ActionConfig,
    #[serde(default)]
    pub cooldown_s: u64,
}

pub async fn create_routine(State(state): State<AppState>, Json(body): Json<CreateRoutineBody>) -> Response {
    let trigger_type_str = match body.trigger_type {
        TriggerType::Cron => "cron",
        TriggerType::Interval => "interval",
        TriggerType::Event => "event",
    };
    if let Err(e) = validate_trigger_config(trigger_type_str, &body.trigger_config) {
        return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "reason": e}))).into_response();
    }

    let routine = Routine {
        routine_id: Uuid::new_v4(),
        user_id: body.user_id,
        name: body.name,
        trigger_type: body.trigger_type,
        trigger_config: body.trigger_config,
        action_config: body.action_config,
        enabled: true,
        last_run_at: None,
        next_run_at: None,
        cooldown_s: body.cooldown_s,
    };
    state.routines.insert(routine.clone());
    (StatusCode::CREATED, Json(serde_json::to_value(routine).unwrap())).into_response()
}

pub async fn delete_routine(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.routines.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

pub async fn list_executions(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    (StatusCode::OK, Json(json!({"executions": state.routines.executions_for(&id)}))).into_response()
}

/// Manual trigger. Runs inline (not through the scheduler's concurrency
/// gate) and records a RoutineExecution the same way a scheduled fire
/// would, so `/api/routine/{id}/executions` reflects both paths.
pub async fn run_routine(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(routine) = state.routines.get(&id) else {
        return not_found();
    };

    let execution_id = Uuid::new_v4();
    let started_at = Utc::now();
    let source_key = routine_source_key(&routine.user_id);

    let outcome = state.orchestrator.run_routine_task(&routine.action_config, &source_key).await;
    let (status, error) = match outcome {
        Ok(()) => (ExecutionStatus::Success, None),
        Err(e) if e == "execution timed out" => (ExecutionStatus::Timeout, Some(e)),
        Err(e) => (ExecutionStatus::Error, Some(e)),
    };

    let execution = RoutineExecution {
        execution_id,
        routine_id: id,
        triggered_by: "manual".into(),
        started_at,
        completed_at: Some(Utc::now()),
        status,
        task_id: None,
        error: error.clone(),
    };
    state.routines.push_execution(execution.clone());
    state.routines.record_run(&id, started_at, routine.next_run_at);

    (StatusCode::OK, Json(serde_json::to_value(execution).unwrap())).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"status": "error", "reason": "routine not found"}))).into_response()
}
