use serde::{Deserialize, Serialize};

/// Where a secret value comes from. Mirrors the precedence an adapter
/// resolves in: plaintext `key` first, then OS keychain, then `env`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

/// A single generic HTTP endpoint: base URL, auth, and per-call timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            auth: AuthConfig::default(),
            model: None,
            timeout_ms: d_timeout_ms(),
        }
    }
}

fn d_timeout_ms() -> u64 {
    30_000
}

/// Endpoints for the three roles the pipeline is allowed to call out to.
/// Concrete vendor clients never appear here — only the generic contract
/// (`Planner`, `Worker`, `Embedder`) each endpoint is plugged into.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub planner: EndpointConfig,
    #[serde(default)]
    pub worker: EndpointConfig,
    #[serde(default)]
    pub embedder: EndpointConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_has_sane_timeout() {
        let cfg = EndpointConfig::default();
        assert_eq!(cfg.timeout_ms, 30_000);
    }

    #[test]
    fn providers_config_default_is_three_local_endpoints() {
        let cfg = ProvidersConfig::default();
        assert!(cfg.planner.base_url.starts_with("http://"));
        assert!(cfg.worker.base_url.starts_with("http://"));
        assert!(cfg.embedder.base_url.starts_with("http://"));
    }
}
