use serde::{Deserialize, Serialize};

/// Optional channels beyond the always-on HTTP/WS/SSE trio — both default
/// to disabled since they require an external subprocess or client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub messaging_subprocess: MessagingSubprocessConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            messaging_subprocess: MessagingSubprocessConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

/// A JSON-RPC-over-stdio subprocess channel (e.g. a messaging-platform
/// bridge). The binary and its args are operator-supplied — this config
/// never hardcodes a vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingSubprocessConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "d_backoff_base_s")]
    pub backoff_base_s: f64,
    #[serde(default = "d_backoff_max_s")]
    pub backoff_max_s: f64,
}

impl Default for MessagingSubprocessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: String::new(),
            args: Vec::new(),
            backoff_base_s: d_backoff_base_s(),
            backoff_max_s: d_backoff_max_s(),
        }
    }
}

fn d_backoff_base_s() -> f64 {
    1.0
}

fn d_backoff_max_s() -> f64 {
    300.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_disabled_by_default() {
        let cfg = ChannelsConfig::default();
        assert!(!cfg.messaging_subprocess.enabled);
        assert!(!cfg.mcp.enabled);
    }

    #[test]
    fn backoff_defaults_match_base_1s_cap_300s() {
        let cfg = MessagingSubprocessConfig::default();
        assert_eq!(cfg.backoff_base_s, 1.0);
        assert_eq!(cfg.backoff_max_s, 300.0);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ChannelsConfig = toml::from_str("").unwrap();
        assert!(!cfg.messaging_subprocess.enabled);
    }
}
