use thiserror::Error;

/// The two failure shapes the orchestrator's trust gate distinguishes:
/// a policy refusal (never runs the action) vs. a runtime failure
/// (the action ran, or tried to, and something went wrong).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool blocked: {0}")]
    Blocked(String),
    #[error("tool error: {0}")]
    Error(String),
}
