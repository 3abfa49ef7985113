use serde::{Deserialize, Serialize};

/// Whether a plan runs immediately, after coarse heuristics, or only
/// after an explicit human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    Full,
    Smart,
    Auto,
}

impl Default for ApprovalMode {
    fn default() -> Self {
        ApprovalMode::Auto
    }
}

impl std::str::FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ApprovalMode::Full),
            "smart" => Ok(ApprovalMode::Smart),
            "auto" => Ok(ApprovalMode::Auto),
            other => Err(format!("unknown approval_mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub mode: ApprovalMode,
    #[serde(default = "d_timeout")]
    pub timeout_s: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::default(),
            timeout_s: d_timeout(),
        }
    }
}

fn d_timeout() -> u64 {
    300
}
