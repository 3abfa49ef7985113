//! Orchestrator-owned session store.
//!
//! Holds every active `Session` in memory behind a single lock, keyed by
//! `source_key`. Eviction runs inline on every `get_or_create` call: TTL
//! first, then capacity. There is no background sweep task — this keeps
//! the store simple and means eviction cost is paid by request traffic,
//! not by an idle timer.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use sentinel_domain::config::SessionsConfig;
use sentinel_domain::data::{ConversationTurn, Session};

/// In-memory session store with TTL + capacity eviction.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    config: SessionsConfig,
}

impl SessionStore {
    pub fn new(config: SessionsConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Look up a session without creating one.
    pub fn get(&self, source_key: &str) -> Option<Session> {
        self.sessions.read().get(source_key).cloned()
    }

    /// Evict expired sessions, then evict by capacity if still over the
    /// limit, then return the session for `source_key` (creating it if
    /// absent). Matches the reference eviction order: TTL before capacity.
    pub fn get_or_create(&self, source_key: &str, source: &str) -> Session {
        let mut sessions = self.sessions.write();
        evict_expired(&mut sessions, self.config.session_ttl);

        if let Some(existing) = sessions.get_mut(source_key) {
            existing.last_active = Utc::now();
            return existing.clone();
        }

        if sessions.len() >= self.config.session_max_count {
            evict_oldest(&mut sessions);
        }

        let mut session = Session::new(source_key);
        session.last_active = Utc::now();
        tracing::info!(source_key, source, "session created");
        sessions.insert(source_key.to_string(), session.clone());
        session
    }

    /// Append `turn` to the session and persist the update. Touches
    /// `last_active`; bumps `violation_count` iff the turn was blocked.
    pub fn add_turn(&self, source_key: &str, turn: ConversationTurn) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(source_key) {
            session.add_turn(turn);
        }
    }

    /// Raise `cumulative_risk` monotonically for `source_key`.
    pub fn raise_cumulative_risk(&self, source_key: &str, candidate: f64) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(source_key) {
            session.raise_cumulative_risk(candidate);
        }
    }

    /// Permanently lock a session: every future request is blocked.
    pub fn lock(&self, source_key: &str) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(source_key) {
            session.lock();
            tracing::warn!(source_key, "session locked");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_expired(sessions: &mut HashMap<String, Session>, ttl_secs: u64) {
    let now = Utc::now();
    let ttl = chrono::Duration::seconds(ttl_secs as i64);
    let before = sessions.len();
    sessions.retain(|_, s| now.signed_duration_since(s.last_active) <= ttl);
    let evicted = before - sessions.len();
    if evicted > 0 {
        tracing::debug!(evicted, "evicted expired sessions");
    }
}

/// Evicts the single session with the oldest `last_active`.
fn evict_oldest(sessions: &mut HashMap<String, Session>) {
    if let Some(key) = sessions
        .iter()
        .min_by_key(|(_, s)| s.last_active)
        .map(|(k, _)| k.clone())
    {
        sessions.remove(&key);
        tracing::debug!(source_key = %key, "evicted oldest session for capacity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_domain::data::ResultStatus;

    fn cfg(ttl: u64, max: usize) -> SessionsConfig {
        SessionsConfig {
            session_ttl: ttl,
            session_max_count: max,
        }
    }

    #[test]
    fn get_or_create_returns_existing_session() {
        let store = SessionStore::new(cfg(3600, 10));
        let a = store.get_or_create("chan:peer1", "http");
        let b = store.get_or_create("chan:peer1", "http");
        assert_eq!(a.session_id, b.session_id);
    }

    #[test]
    fn capacity_eviction_removes_oldest_when_at_limit() {
        let store = SessionStore::new(cfg(3600, 2));
        store.get_or_create("a", "http");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.get_or_create("b", "http");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.get_or_create("c", "http");
        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn ttl_eviction_removes_expired_sessions() {
        let store = SessionStore::new(cfg(0, 10));
        store.get_or_create("a", "http");
        // ttl=0 means every session is immediately eligible on the next call
        store.get_or_create("b", "http");
        assert!(store.get("a").is_none());
    }

    #[test]
    fn add_turn_increments_violation_count_only_on_blocked() {
        let store = SessionStore::new(cfg(3600, 10));
        store.get_or_create("a", "http");
        store.add_turn("a", ConversationTurn::new("hi", ResultStatus::Success));
        store.add_turn("a", ConversationTurn::new("bad", ResultStatus::Blocked));
        let session = store.get("a").unwrap();
        assert_eq!(session.violation_count, 1);
        assert_eq!(session.turns.len(), 2);
    }

    #[test]
    fn lock_permanently_marks_session_locked() {
        let store = SessionStore::new(cfg(3600, 10));
        store.get_or_create("a", "http");
        store.lock("a");
        assert!(store.get("a").unwrap().is_locked);
    }

    #[test]
    fn raise_cumulative_risk_is_monotonic() {
        let store = SessionStore::new(cfg(3600, 10));
        store.get_or_create("a", "http");
        store.raise_cumulative_risk("a", 4.0);
        store.raise_cumulative_risk("a", 2.0);
        assert_eq!(store.get("a").unwrap().cumulative_risk, 4.0);
    }
}
