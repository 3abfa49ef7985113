//! Server-derived session keys.
//!
//! `source_key` MUST be computed from transport-level identity (the
//! channel tag plus whatever peer identifier that channel authenticates),
//! never from a client-supplied session id — otherwise a client could
//! hijack or fabricate another session's risk history.

/// Build the canonical `source_key` for a request: `"<channel>:<peer_id>"`.
pub fn compute_source_key(channel: &str, peer_id: &str) -> String {
    format!("{channel}:{peer_id}")
}

/// `source_key` for routine-originated tasks: `"routine:<user_id>"`.
pub fn routine_source_key(user_id: &str) -> String {
    format!("routine:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_channel_and_peer() {
        assert_eq!(compute_source_key("websocket", "alice"), "websocket:alice");
    }

    #[test]
    fn routine_key_is_namespaced() {
        assert_eq!(routine_source_key("alice"), "routine:alice");
    }

    #[test]
    fn distinct_channels_never_collide_for_same_peer() {
        let a = compute_source_key("websocket", "alice");
        let b = compute_source_key("sse", "alice");
        assert_ne!(a, b);
    }
}
