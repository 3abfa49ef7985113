use serde::{Deserialize, Serialize};

/// Thresholds for the multi-turn conversation analyzer's action decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "d_warn")]
    pub warn_threshold: f64,
    #[serde(default = "d_block")]
    pub block_threshold: f64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            warn_threshold: d_warn(),
            block_threshold: d_block(),
        }
    }
}

fn d_warn() -> f64 {
    5.0
}

fn d_block() -> f64 {
    8.0
}
