//! Shared application state handed to every handler.

use std::sync::Arc;

use sentinel_approval::ApprovalManager;
use sentinel_bus::EventBus;
use sentinel_domain::config::Config;
use sentinel_orchestrator::Orchestrator;
use sentinel_routines::RoutineStore;
use sentinel_sessions::SessionStore;

use crate::auth::FailureTracker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub bus: EventBus,
    pub approval: Arc<ApprovalManager>,
    pub routines: Arc<RoutineStore>,
    pub sessions: Arc<SessionStore>,
    /// SHA-256 digest of the configured PIN. `None` when `pin_required` is
    /// false — every request passes through unauthenticated (dev mode).
    pub pin_hash: Option<Vec<u8>>,
    pub pin_failures: Arc<FailureTracker>,
}
