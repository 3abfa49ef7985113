//! HTTP/WebSocket/SSE gateway binding every request channel onto the
//! orchestrator. The binary entrypoint (`main.rs`) wires the dependency
//! graph; everything else lives here so it's testable without a running
//! server.

pub mod api;
pub mod auth;
pub mod channel;
pub mod channels;
pub mod cli;
pub mod router;
pub mod state;
pub mod ws;
