//! JSON-RPC-over-stdio messaging channel. Spawns a configured subprocess,
//! dispatches JSON-RPC `task` notifications on its stdout into the
//! orchestrator, and writes orchestrator events back to its stdin as
//! `send` requests. Crashes are restarted with exponential backoff.
//!
//! Grounded on `examples/original_source/sentinel/channels/signal_channel.py`'s
//! `ExponentialBackoff`/`_health_monitor`/`_read_loop` contract, generalized
//! away from the Signal-specific vendor integration — the concrete binary
//! and its args are operator config, not hardcoded here.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use sentinel_domain::config::MessagingSubprocessConfig;

use crate::channel::{ChannelRouter, IncomingMessage, OutboundSink, OutgoingMessage};

/// 1s, 2s, 4s, ... capped at `max_delay`. Resets after a clean start.
struct ExponentialBackoff {
    base: f64,
    max_delay: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    fn new(base: f64, max_delay: f64) -> Self {
        Self { base, max_delay, attempt: 0 }
    }

    fn delay(&self) -> Duration {
        let d = self.base * 2f64.powi(self.attempt as i32);
        Duration::from_secs_f64(d.min(self.max_delay))
    }

    fn next_delay(&mut self) -> Duration {
        let d = self.delay();
        self.attempt += 1;
        d
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[derive(Debug, Default, Deserialize)]
struct RpcParams {
    request: Option<String>,
    peer: Option<String>,
    #[serde(default)]
    approval_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RpcNotification {
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: RpcParams,
}

struct SubprocessSink {
    lines_tx: mpsc::Sender<String>,
    rpc_id: Arc<AtomicU64>,
}

impl OutboundSink for SubprocessSink {
    fn send(&self, message: OutgoingMessage) {
        let id = self.rpc_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "method": "send",
            "id": id,
            "params": {
                "type": message.event_type,
                "data": message.data,
            },
        });
        let Ok(line) = serde_json::to_string(&request) else { return };
        let _ = self.lines_tx.try_send(line);
    }
}

/// Owns the supervisor loop for one configured subprocess channel.
pub struct SubprocessChannel {
    config: MessagingSubprocessConfig,
    router: Arc<ChannelRouter>,
}

impl SubprocessChannel {
    pub fn new(config: MessagingSubprocessConfig, router: Arc<ChannelRouter>) -> Self {
        Self { config, router }
    }

    /// No-op when disabled. Otherwise runs for the lifetime of the process
    /// — crashes restart with backoff rather than ending the channel.
    pub fn start(self: Arc<Self>) {
        if !self.config.enabled || self.config.command.is_empty() {
            return;
        }
        tokio::spawn(async move { self.supervise().await });
    }

    async fn supervise(self: Arc<Self>) {
        let mut backoff = ExponentialBackoff::new(self.config.backoff_base_s, self.config.backoff_max_s);
        loop {
            match self.spawn_process() {
                Ok(mut child) => {
                    backoff.reset();
                    tracing::info!(command = %self.config.command, "messaging subprocess started");
                    match self.run_until_exit(&mut child).await {
                        Ok(status) => tracing::warn!(%status, "messaging subprocess exited"),
                        Err(e) => tracing::warn!(error = %e, "messaging subprocess read error"),
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, command = %self.config.command, "failed to start messaging subprocess");
                }
            }

            let delay = backoff.next_delay();
            tracing::warn!(delay_s = delay.as_secs_f64(), attempt = backoff.attempt, "restarting messaging subprocess after backoff");
            tokio::time::sleep(delay).await;
        }
    }

    fn spawn_process(&self) -> std::io::Result<Child> {
        Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    async fn run_until_exit(&self, child: &mut Child) -> std::io::Result<std::process::ExitStatus> {
        let stdin = child.stdin.take().expect("stdin piped at spawn");
        let stdout = child.stdout.take().expect("stdout piped at spawn");

        let (lines_tx, lines_rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(write_loop(stdin, lines_rx));
        let rpc_id = Arc::new(AtomicU64::new(0));
        let sink: Arc<dyn OutboundSink> = Arc::new(SubprocessSink { lines_tx, rpc_id });

        let mut lines = BufReader::new(stdout).lines();
        let status = loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(text) => self.dispatch_line(&text, sink.clone()),
                        None => break child.wait().await,
                    }
                }
                status = child.wait() => break status,
            }
        };

        writer.abort();
        status
    }

    fn dispatch_line(&self, text: &str, sink: Arc<dyn OutboundSink>) {
        let notification: RpcNotification = match serde_json::from_str(text) {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(raw = %truncate(text, 200), "malformed JSON-RPC from messaging subprocess");
                return;
            }
        };
        if notification.method != "task" {
            return;
        }
        let Some(request) = notification.params.request else { return };
        let peer = notification.params.peer.unwrap_or_else(|| "unknown".into());
        let approval_mode = notification.params.approval_mode.unwrap_or_else(|| "auto".into());
        let source_key = sentinel_sessions::compute_source_key("messaging", &peer);

        let router = self.router.clone();
        tokio::spawn(async move {
            router
                .handle_message("messaging", &source_key, IncomingMessage { request, approval_mode }, sink)
                .await;
        });
    }
}

async fn write_loop(mut stdin: ChildStdin, mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(b"\n").await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let mut b = ExponentialBackoff::new(1.0, 300.0);
        assert_eq!(b.next_delay().as_secs_f64(), 1.0);
        assert_eq!(b.next_delay().as_secs_f64(), 2.0);
        assert_eq!(b.next_delay().as_secs_f64(), 4.0);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let mut b = ExponentialBackoff::new(1.0, 10.0);
        for _ in 0..10 {
            b.next_delay();
        }
        assert_eq!(b.delay().as_secs_f64(), 10.0);
    }

    #[test]
    fn backoff_reset_returns_to_base() {
        let mut b = ExponentialBackoff::new(1.0, 300.0);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.delay().as_secs_f64(), 1.0);
    }

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn truncate_clips_long_strings() {
        let long = "a".repeat(300);
        assert_eq!(truncate(&long, 200).len(), 203);
    }
}
