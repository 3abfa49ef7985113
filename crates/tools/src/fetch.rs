//! Network fetch tool. Unlike the file tools, anything that crosses the
//! network boundary is UNTRUSTED by construction — the remote end is not
//! part of the trust boundary this gateway controls.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ToolError;

#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

const DEFAULT_MAX_BYTES: usize = 64 * 1024;

pub async fn fetch(client: &reqwest::Client, req: FetchRequest) -> Result<Value, ToolError> {
    let url: reqwest::Url = req
        .url
        .parse()
        .map_err(|e| ToolError::Blocked(format!("invalid URL '{}': {e}", req.url)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ToolError::Blocked(format!("scheme '{other}' is not permitted, only http/https"))),
    }

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ToolError::Error(format!("fetch failed: {e}")))?;

    let status = resp.status();
    let max_bytes = req.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ToolError::Error(format!("failed to read response body: {e}")))?;
    let truncated = bytes.len() > max_bytes;
    let body = String::from_utf8_lossy(&bytes[..bytes.len().min(max_bytes)]).into_owned();

    Ok(serde_json::json!({
        "url": req.url,
        "status": status.as_u16(),
        "body": body,
        "truncated": truncated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_rejects_non_http_scheme() {
        let client = reqwest::Client::new();
        let result = fetch(&client, FetchRequest { url: "file:///etc/passwd".into(), max_bytes: None }).await;
        assert!(matches!(result, Err(ToolError::Blocked(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_url() {
        let client = reqwest::Client::new();
        let result = fetch(&client, FetchRequest { url: "not a url".into(), max_bytes: None }).await;
        assert!(matches!(result, Err(ToolError::Blocked(_))));
    }
}
