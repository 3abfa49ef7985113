//! MCP server channel: newline-delimited JSON-RPC 2.0 over stdio, run as
//! `sentinel mcp`. Exposes a fixed tool surface — `search_memory`,
//! `store_memory`, `run_task`, `health_check` — and deliberately never
//! exposes routine CRUD (spec.md §4.13).
//!
//! The wire shapes mirror the teacher's `sa-mcp-client` crate's
//! `protocol.rs` (`JsonRpcRequest`/`JsonRpcResponse`/`JsonRpcError`,
//! `McpToolDef`, `ToolCallResult`), with this side playing the server role
//! that crate's `StdioTransport` was written to talk to.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use sentinel_bus::EventBus;
use sentinel_orchestrator::Orchestrator;
use sentinel_routines::RoutineStore;
use sentinel_sessions::{compute_source_key, SessionStore};

use crate::channel::{ChannelRouter, IncomingMessage, OutgoingMessage};

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<u64>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn ok(id: u64, result: Value) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0", id, result: Some(result), error: None }
}

fn err(id: u64, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0", id, result: None, error: Some(JsonRpcError { code, message: message.into() }) }
}

fn tool_def(name: &str, description: &str, input_schema: Value) -> Value {
    json!({"name": name, "description": description, "inputSchema": input_schema})
}

fn tool_text_result(text: impl Into<String>, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}], "isError": is_error})
}

struct NullSink;

impl crate::channel::OutboundSink for NullSink {
    fn send(&self, _message: OutgoingMessage) {}
}

/// Shared services an MCP tool call needs. Deliberately excludes
/// `RoutineStore`'s CRUD surface — routines are never reachable from this
/// channel, even read-only, per spec.md §4.13.
pub struct McpServer {
    router: ChannelRouter,
    sessions: Arc<SessionStore>,
    routines: Arc<RoutineStore>,
    bus: EventBus,
}

impl McpServer {
    pub fn new(orchestrator: Arc<Orchestrator>, bus: EventBus, sessions: Arc<SessionStore>, routines: Arc<RoutineStore>) -> Self {
        Self { router: ChannelRouter::new(orchestrator, bus.clone()), sessions, routines, bus }
    }

    /// Serve JSON-RPC requests from `stdin`, one per line, writing each
    /// response to `stdout` as a single line. Runs until stdin closes.
    pub async fn serve_stdio(self) -> std::io::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(req) => self.dispatch(req).await,
                Err(e) => err(0, -32700, format!("parse error: {e}")),
            };
            let Ok(text) = serde_json::to_string(&response) else { continue };
            stdout.write_all(text.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok(())
    }

    async fn dispatch(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.unwrap_or(0);
        match req.method.as_str() {
            "tools/list" => ok(id, json!({"tools": Self::tool_defs()})),
            "tools/call" => self.call_tool(id, req.params).await,
            "initialize" => ok(id, json!({"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}})),
            other => err(id, -32601, format!("method not found: {other}")),
        }
    }

    fn tool_defs() -> Vec<Value> {
        vec![
            tool_def(
                "run_task",
                "Submit a natural-language task request to the gateway and wait for its result.",
                json!({"type": "object", "properties": {"request": {"type": "string"}, "approval_mode": {"type": "string"}}, "required": ["request"]}),
            ),
            tool_def(
                "search_memory",
                "Search stored memory entries (not implemented in this core).",
                json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
            ),
            tool_def(
                "store_memory",
                "Persist a memory entry (not implemented in this core).",
                json!({"type": "object", "properties": {"content": {"type": "string"}}, "required": ["content"]}),
            ),
            tool_def("health_check", "Report gateway liveness and basic counters.", json!({"type": "object", "properties": {}})),
        ]
    }

    async fn call_tool(&self, id: u64, params: Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return err(id, -32602, "missing tool name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match name {
            "run_task" => self.run_task(id, arguments).await,
            "search_memory" | "store_memory" => {
                ok(id, tool_text_result("memory subsystem is not part of this core", true))
            }
            "health_check" => {
                ok(
                    id,
                    tool_text_result(
                        json!({
                            "status": "ok",
                            "sessions": self.sessions.len(),
                            "routines": self.routines.list().len(),
                            "bus_subscribers": self.bus.subscriber_count().await,
                        })
                        .to_string(),
                        false,
                    ),
                )
            }
            other => err(id, -32601, format!("unknown tool: {other}")),
        }
    }

    async fn run_task(&self, id: u64, arguments: Value) -> JsonRpcResponse {
        let Some(request) = arguments.get("request").and_then(Value::as_str) else {
            return err(id, -32602, "missing required argument \"request\"");
        };
        let approval_mode = arguments.get("approval_mode").and_then(Value::as_str).unwrap_or("auto").to_string();
        let source_key = compute_source_key("mcp", "stdio");

        let message = IncomingMessage { request: request.to_string(), approval_mode };
        let result_json = self.router.handle_message("mcp", &source_key, message, Arc::new(NullSink)).await;
        ok(id, tool_text_result(result_json, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_defs_expose_exactly_the_fixed_surface() {
        let names: Vec<&str> = McpServer::tool_defs()
            .iter()
            .map(|t| t.get("name").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(names, vec!["run_task", "search_memory", "store_memory", "health_check"]);
    }

    #[test]
    fn tool_defs_never_include_routine_crud() {
        let dump = serde_json::to_string(&McpServer::tool_defs()).unwrap();
        assert!(!dump.contains("routine"));
    }

    #[test]
    fn ok_response_has_no_error() {
        let resp = ok(1, json!({"a": 1}));
        assert!(resp.error.is_none());
        assert_eq!(resp.id, 1);
    }

    #[test]
    fn err_response_has_no_result() {
        let resp = err(2, -32601, "nope");
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, -32601);
    }
}
