use serde::{Deserialize, Serialize};

/// Filesystem locations the gateway is allowed to touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_policy_file")]
    pub policy_file: String,
    #[serde(default = "d_workspace_path")]
    pub workspace_path: String,
    #[serde(default = "d_db_path")]
    pub db_path: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            policy_file: d_policy_file(),
            workspace_path: d_workspace_path(),
            db_path: d_db_path(),
        }
    }
}

fn d_policy_file() -> String {
    "policy.toml".into()
}

fn d_workspace_path() -> String {
    "./workspace".into()
}

fn d_db_path() -> String {
    "./sentinel.db".into()
}
