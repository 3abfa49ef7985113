use serde::{Deserialize, Serialize};

/// Routine engine scheduling knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutinesConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    /// Scheduler tick interval, seconds.
    #[serde(default = "d_scheduler_interval")]
    pub scheduler_interval_s: u64,
    /// Per-execution wall-clock timeout, seconds.
    #[serde(default = "d_execution_timeout")]
    pub execution_timeout_s: u64,
    /// Max routines a single user may register.
    #[serde(default = "d_max_per_user")]
    pub max_per_user: usize,
}

impl Default for RoutinesConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            max_concurrent: d_max_concurrent(),
            scheduler_interval_s: d_scheduler_interval(),
            execution_timeout_s: d_execution_timeout(),
            max_per_user: d_max_per_user(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_max_concurrent() -> usize {
    3
}
fn d_scheduler_interval() -> u64 {
    15
}
fn d_execution_timeout() -> u64 {
    300
}
fn d_max_per_user() -> usize {
    50
}
