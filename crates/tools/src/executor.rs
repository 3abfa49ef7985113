//! The tool executor: the only component allowed to perform side
//! effects on the plan's behalf. The orchestrator treats it as a black
//! box — it hands over a tool name and resolved args, and gets back a
//! provenance-tagged result or a typed failure.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sentinel_domain::data::{DataSource, TaggedData, ToolDescription, TrustLevel};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ToolError;
use crate::fetch::{self, FetchRequest};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest, FileReadRequest,
    FileWriteRequest,
};

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn get_tool_descriptions(&self) -> Vec<ToolDescription>;

    /// `parent_ids` are the provenance ids of whatever data fed this
    /// call's args — the orchestrator has already run them through the
    /// trust gate by the time this is invoked, so every id here is
    /// TRUSTED. They're threaded through purely to keep the provenance
    /// chain complete for later steps.
    async fn execute(
        &self,
        tool_name: &str,
        args: Value,
        parent_ids: Vec<Uuid>,
    ) -> Result<TaggedData, ToolError>;
}

pub struct SentinelToolExecutor {
    workspace_root: PathBuf,
    http_client: reqwest::Client,
}

impl SentinelToolExecutor {
    pub fn new(workspace_root: PathBuf) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self { workspace_root, http_client }
    }

    fn tagged(&self, content: Value, trust_level: TrustLevel, tool_name: &str, parent_ids: Vec<Uuid>) -> TaggedData {
        TaggedData::new(content.to_string(), DataSource::Tool, trust_level, tool_name, parent_ids)
    }
}

#[async_trait]
impl ToolExecutor for SentinelToolExecutor {
    fn get_tool_descriptions(&self) -> Vec<ToolDescription> {
        vec![
            ToolDescription {
                name: "file_read".into(),
                description: "Read a file within the workspace, optionally by line range.".into(),
                args_schema: serde_json::json!({"path": "string", "offset": "number?", "limit": "number?"}),
                trust_level: TrustLevel::Trusted,
            },
            ToolDescription {
                name: "file_write".into(),
                description: "Write (create or overwrite) a file within the workspace.".into(),
                args_schema: serde_json::json!({"path": "string", "content": "string"}),
                trust_level: TrustLevel::Trusted,
            },
            ToolDescription {
                name: "file_append".into(),
                description: "Append content to a file within the workspace.".into(),
                args_schema: serde_json::json!({"path": "string", "content": "string"}),
                trust_level: TrustLevel::Trusted,
            },
            ToolDescription {
                name: "file_move".into(),
                description: "Move or rename a file within the workspace.".into(),
                args_schema: serde_json::json!({"source": "string", "destination": "string"}),
                trust_level: TrustLevel::Trusted,
            },
            ToolDescription {
                name: "file_delete".into(),
                description: "Delete a file or empty directory within the workspace.".into(),
                args_schema: serde_json::json!({"path": "string"}),
                trust_level: TrustLevel::Trusted,
            },
            ToolDescription {
                name: "file_list".into(),
                description: "List a directory within the workspace.".into(),
                args_schema: serde_json::json!({"path": "string?"}),
                trust_level: TrustLevel::Trusted,
            },
            ToolDescription {
                name: "network_fetch".into(),
                description: "Fetch an http(s) URL. Output is untrusted data from outside the workspace.".into(),
                args_schema: serde_json::json!({"url": "string", "max_bytes": "number?"}),
                trust_level: TrustLevel::Untrusted,
            },
        ]
    }

    async fn execute(
        &self,
        tool_name: &str,
        args: Value,
        parent_ids: Vec<Uuid>,
    ) -> Result<TaggedData, ToolError> {
        let (result, trust_level) = match tool_name {
            "file_read" => {
                let req: FileReadRequest = parse_args(args)?;
                (file_ops::file_read(&self.workspace_root, req).await?, TrustLevel::Trusted)
            }
            "file_write" => {
                let req: FileWriteRequest = parse_args(args)?;
                (file_ops::file_write(&self.workspace_root, req).await?, TrustLevel::Trusted)
            }
            "file_append" => {
                let req: FileAppendRequest = parse_args(args)?;
                (file_ops::file_append(&self.workspace_root, req).await?, TrustLevel::Trusted)
            }
            "file_move" => {
                let req: FileMoveRequest = parse_args(args)?;
                (file_ops::file_move(&self.workspace_root, req).await?, TrustLevel::Trusted)
            }
            "file_delete" => {
                let req: FileDeleteRequest = parse_args(args)?;
                (file_ops::file_delete(&self.workspace_root, req).await?, TrustLevel::Trusted)
            }
            "file_list" => {
                let req: FileListRequest = parse_args(args)?;
                (file_ops::file_list(&self.workspace_root, req).await?, TrustLevel::Trusted)
            }
            "network_fetch" => {
                let req: FetchRequest = parse_args(args)?;
                (fetch::fetch(&self.http_client, req).await?, TrustLevel::Untrusted)
            }
            other => return Err(ToolError::Blocked(format!("unknown tool '{other}'"))),
        };

        Ok(self.tagged(result, trust_level, tool_name, parent_ids))
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Blocked(format!("malformed tool args: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn executor() -> (SentinelToolExecutor, TempDir) {
        let ws = TempDir::new().unwrap();
        (SentinelToolExecutor::new(ws.path().to_path_buf()), ws)
    }

    #[test]
    fn descriptions_mark_network_fetch_untrusted_and_files_trusted() {
        let (executor, _ws) = executor();
        let descriptions = executor.get_tool_descriptions();
        let fetch = descriptions.iter().find(|d| d.name == "network_fetch").unwrap();
        assert_eq!(fetch.trust_level, TrustLevel::Untrusted);
        let read = descriptions.iter().find(|d| d.name == "file_read").unwrap();
        assert_eq!(read.trust_level, TrustLevel::Trusted);
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_blocked() {
        let (executor, _ws) = executor();
        let result = executor.execute("does_not_exist", serde_json::json!({}), vec![]).await;
        assert!(matches!(result, Err(ToolError::Blocked(_))));
    }

    #[tokio::test]
    async fn execute_file_write_then_read_roundtrips_and_tags_trusted() {
        let (executor, _ws) = executor();
        let write_args = serde_json::json!({"path": "note.txt", "content": "hi"});
        let written = executor.execute("file_write", write_args, vec![]).await.unwrap();
        assert_eq!(written.source, DataSource::Tool);
        assert_eq!(written.trust_level, TrustLevel::Trusted);

        let read_args = serde_json::json!({"path": "note.txt"});
        let read = executor.execute("file_read", read_args, vec![]).await.unwrap();
        assert!(read.content.contains("\"content\":\"hi\""));
    }

    #[tokio::test]
    async fn execute_malformed_args_is_blocked_not_errored() {
        let (executor, _ws) = executor();
        let result = executor.execute("file_read", serde_json::json!({"path": 5}), vec![]).await;
        assert!(matches!(result, Err(ToolError::Blocked(_))));
    }
}
