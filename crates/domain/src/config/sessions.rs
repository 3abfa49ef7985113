use serde::{Deserialize, Serialize};

/// Session store TTL/capacity eviction knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Seconds of inactivity before a session is evicted.
    #[serde(default = "d_ttl")]
    pub session_ttl: u64,
    /// Hard cap on concurrent sessions (`N_max`); LRU-evicted past this.
    #[serde(default = "d_max_count")]
    pub session_max_count: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            session_ttl: d_ttl(),
            session_max_count: d_max_count(),
        }
    }
}

fn d_ttl() -> u64 {
    3600
}

fn d_max_count() -> usize {
    10_000
}
