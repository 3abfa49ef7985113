//! Embedder client: the only seam the (out-of-scope) vector/FTS5 memory
//! subsystem needs from this crate. Memory storage, ranking, and search
//! live entirely outside this crate; this is just the text-to-vector call.

use std::time::Duration;

use async_trait::async_trait;

use crate::auth::resolve_api_key;
use crate::error::{from_reqwest, ProviderError};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

pub struct HttpEmbedder {
    base_url: String,
    api_key: Option<String>,
    model: Option<String>,
    client: reqwest::Client,
}

impl HttpEmbedder {
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
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model.clone().unwrap_or_else(|| "embedder".to_string()),
            "input": texts,
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
        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_domain::config::EndpointConfig;

    #[test]
    fn new_builds_with_default_auth() {
        let cfg = EndpointConfig {
            base_url: "http://127.0.0.1:9999".into(),
            auth: Default::default(),
            model: None,
            timeout_ms: 1000,
        };
        assert!(HttpEmbedder::new(&cfg).is_ok());
    }
}
