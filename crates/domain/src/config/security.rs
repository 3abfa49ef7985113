use serde::{Deserialize, Serialize};

/// Scanner chain configuration: pattern lists and ML-scanner fail-closed knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Literal paths and globs the sensitive-path scanner flags.
    #[serde(default = "d_sensitive_paths")]
    pub sensitive_paths: Vec<String>,
    /// Regex patterns the command-pattern scanner flags.
    #[serde(default = "d_denied_command_patterns")]
    pub denied_command_patterns: Vec<String>,
    /// When true, an unavailable PromptGuard model fails the pipeline closed
    /// rather than being treated as a no-op.
    #[serde(default)]
    pub prompt_guard_required: bool,
    /// Same fail-closed semantics for the CodeShield scanner.
    #[serde(default)]
    pub code_shield_required: bool,
    /// Probability threshold (0.0-1.0) above which PromptGuard reports a hit.
    #[serde(default = "d_prompt_guard_threshold")]
    pub prompt_guard_threshold: f32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sensitive_paths: d_sensitive_paths(),
            denied_command_patterns: d_denied_command_patterns(),
            prompt_guard_required: false,
            code_shield_required: false,
            prompt_guard_threshold: d_prompt_guard_threshold(),
        }
    }
}

fn d_sensitive_paths() -> Vec<String> {
    vec![
        "/etc/shadow".into(),
        "/etc/passwd".into(),
        "~/.ssh/*".into(),
        "~/.aws/credentials".into(),
        "/root/*".into(),
    ]
}

fn d_denied_command_patterns() -> Vec<String> {
    vec![
        r"\|\s*(?:ba)?sh\b".into(),
        r"(?:nc|ncat|netcat)\s+-e\b".into(),
        r"bash\s+-i\s+>&\s*/dev/tcp".into(),
        r"echo\s+\S+\s*\|\s*base64\s+(?:-d|--decode)\s*\|\s*(?:ba)?sh".into(),
        r"chmod\s+\+?[ug]?s\b".into(),
        r"nohup\s+.+&\s*$".into(),
        r"rm\s+-rf\s+/".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}

fn d_prompt_guard_threshold() -> f32 {
    0.8
}
