//! Worker client: the air-gapped generation call inside the scan
//! pipeline. Implements `sentinel_security::WorkerClient` — the pipeline
//! never sees which concrete backend is behind it.
//!
//! Transport-level retry: a single retry on connection/timeout failure,
//! then the error surfaces to the pipeline as a `WorkerError`.

use std::time::Duration;

use async_trait::async_trait;
use sentinel_security::WorkerClient;

use crate::auth::resolve_api_key;
use crate::error::{from_reqwest, ProviderError};

pub struct HttpWorkerClient {
    base_url: String,
    api_key: Option<String>,
    model: Option<String>,
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(cfg: &sentinel_domain::config::EndpointConfig) -> Result<Self, ProviderError> {
        let api_key = if cfg.auth.key.is_some() || cfg.auth.env.is_some() || cfg.auth.service.is_some()
        {
            Some(resolve_api_key(&cfg.auth)?)
        } else {
            None
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            client,
        })
    }

    async fn send_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model.clone().unwrap_or_else(|| "worker".to_string()),
            "messages": [{"role": "user", "content": prompt}],
        });
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn generate(&self, prompt: &str, marker: Option<&str>) -> Result<String, String> {
        // marker is applied by the pipeline's spotlighting step before the
        // prompt reaches here; it's accepted for trait-compatibility only.
        let _ = marker;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retriable() && attempt < 2 => {
                    tracing::warn!(error = %e, attempt, "worker call failed, retrying once");
                    continue;
                }
                Err(e) => return Err(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_domain::config::EndpointConfig;

    #[test]
    fn new_without_auth_configured_succeeds() {
        let cfg = EndpointConfig {
            base_url: "http://127.0.0.1:9999".into(),
            auth: Default::default(),
            model: Some("local-worker".into()),
            timeout_ms: 1000,
        };
        assert!(HttpWorkerClient::new(&cfg).is_ok());
    }
}
