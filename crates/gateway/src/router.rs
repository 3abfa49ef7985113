//! Route table: wires every handler in `api/` behind PIN auth and a
//! per-IP rate limit on the task-submission endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;

use crate::auth;
use crate::state::AppState;
use crate::{api, ws};

/// `requests_per_minute` is spec.md's unit; `tower_governor` works in
/// per-second refill rate, so this converts to "1 token every N seconds"
/// with a small burst to absorb a client's first few requests.
pub fn build(state: AppState, requests_per_minute: u32, allowed_origins: &[String]) -> Router {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second((60 / requests_per_minute.max(1)).max(1) as u64)
            .burst_size(requests_per_minute.max(1).min(20))
            .finish()
            .expect("rate_limit: requests_per_minute must be > 0"),
    );

    let task_routes = Router::new()
        .route("/api/task", post(api::task::submit_task))
        .layer(GovernorLayer {
            config: governor_conf,
        });

    let protected = Router::new()
        .merge(task_routes)
        .route("/api/approval/:id", get(api::approval::get_approval).post(api::approval::submit_approval))
        .route("/api/session/:source_key", get(api::session::get_session))
        .route("/api/memory", post(api::memory::store_memory).get(api::memory::search_memory))
        .route("/api/memory/:id", get(api::memory::get_memory).delete(api::memory::delete_memory))
        .route("/api/routine", get(api::routine::list_routines).post(api::routine::create_routine))
        .route("/api/routine/:id", get(api::routine::get_routine).delete(api::routine::delete_routine))
        .route("/api/routine/:id/executions", get(api::routine::list_executions))
        .route("/api/routine/:id/run", post(api::routine::run_routine))
        .route("/api/events", get(api::events::events))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_pin));

    // `/ws` authenticates in-band (first frame must be `{"type":"auth",...}`)
    // since browser WebSocket clients cannot set a custom header during the
    // handshake — it sits outside the PIN header middleware by design.
    Router::new()
        .route("/health", get(api::health::health))
        .route("/ws", get(ws::handler))
        .merge(protected)
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}
