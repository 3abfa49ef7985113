//! Concrete channels beyond the always-on HTTP/WebSocket/SSE trio in `api`/`ws`.

pub mod mcp;
pub mod subprocess;
