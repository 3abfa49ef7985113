//! PIN authentication: constant-time comparison middleware plus the
//! per-IP failure tracker spec.md §5 requires (5 failures → 60s lockout).
//!
//! Grounded on the teacher's bearer-token middleware (`require_api_token`)
//! — same constant-time-compare-a-hash shape, swapped to a PIN and a
//! lockout counter the teacher's version didn't need.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

const MAX_FAILURES: u32 = 5;
const LOCKOUT: Duration = Duration::from_secs(60);

pub fn hash_pin(pin: &str) -> Vec<u8> {
    Sha256::digest(pin.as_bytes()).to_vec()
}

pub fn pin_matches(expected_hash: &[u8], candidate: &str) -> bool {
    let candidate_hash = Sha256::digest(candidate.as_bytes());
    bool::from(candidate_hash.ct_eq(expected_hash))
}

struct FailureEntry {
    count: u32,
    locked_until: Option<Instant>,
}

/// Per-IP failed-auth counter. A clean success resets the entry; 5 failures
/// within the window open a 60s lockout.
#[derive(Default)]
pub struct FailureTracker {
    entries: Mutex<HashMap<IpAddr, FailureEntry>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, ip: IpAddr) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&ip) {
            Some(entry) => match entry.locked_until {
                Some(until) if Instant::now() < until => true,
                Some(_) => {
                    entries.remove(&ip);
                    false
                }
                None => false,
            },
            None => false,
        }
    }

    pub fn record_failure(&self, ip: IpAddr) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(ip).or_insert(FailureEntry { count: 0, locked_until: None });
        entry.count += 1;
        if entry.count >= MAX_FAILURES {
            entry.locked_until = Some(Instant::now() + LOCKOUT);
        }
    }

    pub fn record_success(&self, ip: IpAddr) {
        self.entries.lock().remove(&ip);
    }
}

fn error_body(status: StatusCode, reason: &str) -> Response {
    (status, axum::Json(serde_json::json!({"status": "error", "reason": reason}))).into_response()
}

/// Axum middleware enforcing PIN auth on protected routes. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_pin(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.pin_hash else {
        return next.run(req).await;
    };

    let ip = addr.ip();
    if state.pin_failures.is_locked(ip) {
        return error_body(StatusCode::TOO_MANY_REQUESTS, "too many failed PIN attempts, try again later");
    }

    let provided = req
        .headers()
        .get("x-sentinel-pin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !pin_matches(expected_hash, provided) {
        state.pin_failures.record_failure(ip);
        return error_body(StatusCode::UNAUTHORIZED, "invalid or missing PIN");
    }

    state.pin_failures.record_success(ip);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_matches_accepts_correct_pin() {
        let hash = hash_pin("1234");
        assert!(pin_matches(&hash, "1234"));
        assert!(!pin_matches(&hash, "0000"));
    }

    #[test]
    fn failure_tracker_locks_after_five_failures() {
        let tracker = FailureTracker::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..4 {
            tracker.record_failure(ip);
            assert!(!tracker.is_locked(ip));
        }
        tracker.record_failure(ip);
        assert!(tracker.is_locked(ip));
    }

    #[test]
    fn success_clears_failure_count() {
        let tracker = FailureTracker::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..4 {
            tracker.record_failure(ip);
        }
        tracker.record_success(ip);
        assert!(!tracker.is_locked(ip));
    }
}
