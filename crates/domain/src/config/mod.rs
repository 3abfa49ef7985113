mod approval;
mod channels;
mod conversation;
mod observability;
mod providers;
mod routines;
mod security;
mod server;
mod sessions;
mod workspace;

pub use approval::*;
pub use channels::*;
pub use conversation::*;
pub use observability::*;
pub use providers::*;
pub use routines::*;
pub use security::*;
pub use server::*;
pub use sessions::*;
pub use workspace::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub routines: RoutinesConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Env var prefix every `SENTINEL_*` override uses.
pub const ENV_PREFIX: &str = "SENTINEL_";

impl Config {
    /// Load from a TOML file if `path` exists, then apply `SENTINEL_*` env
    /// overrides on top (env always wins — matches how operators expect a
    /// 12-factor-style deployment to behave).
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        let mut cfg = match path {
            Some(p) if std::path::Path::new(p).exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))?
            }
            _ => Config::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($key:literal) => {
                std::env::var(concat!("SENTINEL_", $key)).ok()
            };
        }
        macro_rules! env_parsed {
            ($key:literal, $field:expr) => {
                if let Some(v) = env_str!($key) {
                    if let Ok(parsed) = v.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        if let Some(v) = env_str!("WORKSPACE_PATH") {
            self.workspace.workspace_path = v;
        }
        if let Some(v) = env_str!("POLICY_FILE") {
            self.workspace.policy_file = v;
        }
        if let Some(v) = env_str!("DB_PATH") {
            self.workspace.db_path = v;
        }
        if let Some(v) = env_str!("APPROVAL_MODE") {
            if let Ok(mode) = v.parse() {
                self.approval.mode = mode;
            }
        }
        env_parsed!("SESSION_TTL", self.sessions.session_ttl);
        env_parsed!("SESSION_MAX_COUNT", self.sessions.session_max_count);
        env_parsed!(
            "CONVERSATION_WARN_THRESHOLD",
            self.conversation.warn_threshold
        );
        env_parsed!(
            "CONVERSATION_BLOCK_THRESHOLD",
            self.conversation.block_threshold
        );
        env_parsed!("ROUTINE_ENABLED", self.routines.enabled);
        env_parsed!("ROUTINE_MAX_CONCURRENT", self.routines.max_concurrent);
        env_parsed!(
            "ROUTINE_SCHEDULER_INTERVAL",
            self.routines.scheduler_interval_s
        );
        env_parsed!(
            "ROUTINE_EXECUTION_TIMEOUT",
            self.routines.execution_timeout_s
        );
        env_parsed!("ROUTINE_MAX_PER_USER", self.routines.max_per_user);
        if let Some(v) = env_str!("ALLOWED_ORIGINS") {
            self.server.allowed_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        env_parsed!("MAX_REQUEST_BYTES", self.server.max_request_bytes);
        env_parsed!("PIN_REQUIRED", self.server.pin_required);
        if let Some(v) = env_str!("PIN_FILE") {
            self.server.pin_file = Some(v);
        }
        if let Some(v) = env_str!("TLS_CERT_FILE") {
            self.server.tls_cert_file = Some(v);
        }
        env_parsed!("HTTP_PORT", self.server.http_port);
        if let Some(v) = env_str!("HTTPS_PORT") {
            self.server.https_port = v.parse().ok();
        }
        if let Some(v) = env_str!("EXTERNAL_HTTPS_PORT") {
            self.server.external_https_port = v.parse().ok();
        }
        env_parsed!("VERBOSE_RESULTS", self.server.verbose_results);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty
    /// means the config is safe to run with.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.http_port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.pin_required && self.server.pin_file.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.pin_file".into(),
                message: "pin_required is set but pin_file is not configured".into(),
            });
        }

        if self.server.allowed_origins.iter().any(|o| o == "*") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.allowed_origins".into(),
                message: "wildcard CORS origin allows any site to call this gateway".into(),
            });
        }

        if self.server.max_request_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.max_request_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.sessions.session_max_count == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.session_max_count".into(),
                message: "must allow at least one session".into(),
            });
        }

        if self.conversation.block_threshold <= self.conversation.warn_threshold {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "conversation.block_threshold".into(),
                message: "block_threshold must be greater than warn_threshold".into(),
            });
        }

        if self.routines.max_concurrent == 0 && self.routines.enabled {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "routines.max_concurrent".into(),
                message: "must allow at least one concurrent execution when routines are enabled"
                    .into(),
            });
        }

        for pattern in &self.security.denied_command_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "security.denied_command_patterns".into(),
                    message: format!("invalid regex {pattern:?}: {e}"),
                });
            }
        }

        if !(0.0..=1.0).contains(&self.security.prompt_guard_threshold) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "security.prompt_guard_threshold".into(),
                message: "must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|i| i.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_validates_clean() {
        assert!(valid_config().validate().is_empty());
    }

    #[test]
    fn zero_port_is_error() {
        let mut cfg = valid_config();
        cfg.server.http_port = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.http_port").is_some());
    }

    #[test]
    fn pin_required_without_file_is_error() {
        let mut cfg = valid_config();
        cfg.server.pin_required = true;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.pin_file").is_some());
    }

    #[test]
    fn wildcard_cors_is_warning_not_error() {
        let mut cfg = valid_config();
        cfg.server.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.allowed_origins").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn block_threshold_must_exceed_warn_threshold() {
        let mut cfg = valid_config();
        cfg.conversation.warn_threshold = 8.0;
        cfg.conversation.block_threshold = 5.0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "conversation.block_threshold").is_some());
    }

    #[test]
    fn invalid_denied_pattern_is_error() {
        let mut cfg = valid_config();
        cfg.security.denied_command_patterns = vec!["(unclosed".into()];
        let issues = cfg.validate();
        assert!(find_issue(&issues, "security.denied_command_patterns").is_some());
    }

    #[test]
    fn env_override_changes_http_port() {
        std::env::set_var("SENTINEL_HTTP_PORT", "9999");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.server.http_port, 9999);
        std::env::remove_var("SENTINEL_HTTP_PORT");
    }

    #[test]
    fn env_override_parses_allowed_origins_list() {
        std::env::set_var("SENTINEL_ALLOWED_ORIGINS", "https://a.example, https://b.example");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert_eq!(
            cfg.server.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        std::env::remove_var("SENTINEL_ALLOWED_ORIGINS");
    }
}
