use serde::{Deserialize, Serialize};

/// HTTP/TLS transport configuration. The transport layer itself (PIN auth
/// middleware, CSRF, TLS termination) is an external collaborator — this
/// struct only carries the knobs it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub https_port: Option<u16>,
    #[serde(default)]
    pub external_https_port: Option<u16>,
    #[serde(default)]
    pub tls_cert_file: Option<String>,
    /// CSRF/CORS allowlist. `["*"]` is accepted but triggers a validation warning.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "d_max_request_bytes")]
    pub max_request_bytes: usize,
    #[serde(default)]
    pub pin_required: bool,
    #[serde(default)]
    pub pin_file: Option<String>,
    #[serde(default)]
    pub verbose_results: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: d_http_port(),
            https_port: None,
            external_https_port: None,
            tls_cert_file: None,
            allowed_origins: Vec::new(),
            max_request_bytes: d_max_request_bytes(),
            pin_required: false,
            pin_file: None,
            verbose_results: false,
        }
    }
}

fn d_http_port() -> u16 {
    8080
}

fn d_max_request_bytes() -> usize {
    50_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_8080() {
        assert_eq!(ServerConfig::default().http_port, 8080);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.max_request_bytes, 50_000);
        assert!(!cfg.pin_required);
    }
}
