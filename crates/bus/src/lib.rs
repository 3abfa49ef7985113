//! Async publish/subscribe event bus with glob-style topic matching.
//!
//! Topics are dot-separated strings (`"routine.triggered"`,
//! `"session.created"`); subscribers register a glob pattern
//! (`"routine.*"`, `"*"`) and are matched with shell-style wildcards,
//! not a topic hierarchy. A handler's failure is logged and isolated —
//! it never prevents sibling handlers on the same topic from running.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A subscribed callback. Wrapped in `Arc` so subscribe/unsubscribe can
/// compare handler identity with `Arc::ptr_eq`.
pub type Handler = Arc<dyn Fn(String, serde_json::Value) -> HandlerFuture + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    handler: Handler,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handler", &"<fn>")
            .finish()
    }
}

/// Concurrent pub/sub bus. Cheap to clone — internal state is `Arc`-shared.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<HashMap<String, Vec<Subscription>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `pattern`. Idempotent: subscribing the same
    /// handler to the same pattern twice is a no-op and returns `false`.
    pub async fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> bool {
        let pattern = pattern.into();
        let mut subs = self.inner.write().await;
        let entry = subs.entry(pattern).or_default();
        if entry
            .iter()
            .any(|s| Arc::ptr_eq(&s.handler, &handler))
        {
            return false;
        }
        entry.push(Subscription { handler });
        true
    }

    /// Unsubscribe `handler` from `pattern`. A no-op (returns `false`) if
    /// the pair was never subscribed. Removes the pattern entry entirely
    /// once its handler list is empty.
    pub async fn unsubscribe(&self, pattern: &str, handler: &Handler) -> bool {
        let mut subs = self.inner.write().await;
        let Some(entry) = subs.get_mut(pattern) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|s| !Arc::ptr_eq(&s.handler, handler));
        let removed = entry.len() != before;
        if entry.is_empty() {
            subs.remove(pattern);
        }
        removed
    }

    /// Publish `topic` with `data` to every subscription whose pattern
    /// glob-matches it. Handlers run concurrently; a handler's error is
    /// logged and does not affect its siblings or the caller.
    pub async fn publish(&self, topic: &str, data: serde_json::Value) {
        let matching: Vec<Handler> = {
            let subs = self.inner.read().await;
            subs.iter()
                .filter(|(pattern, _)| topic_matches(pattern, topic))
                .flat_map(|(_, subs)| subs.iter().map(|s| s.handler.clone()))
                .collect()
        };

        if matching.is_empty() {
            return;
        }

        let futures = matching
            .into_iter()
            .map(|handler| handler(topic.to_string(), data.clone()));
        let results = futures_util::future::join_all(futures).await;
        for result in results {
            if let Err(e) = result {
                tracing::warn!(topic, error = %e, "event handler failed");
            }
        }
    }

    /// Total number of (pattern, handler) subscriptions across the bus.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.values().map(Vec::len).sum()
    }

    /// All patterns with at least one subscriber.
    pub async fn patterns(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}

/// Shell-style glob match (`*`, `?`, `[...]`), mirroring `fnmatch.fnmatch`.
fn topic_matches(pattern: &str, topic: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(topic))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_topic, _data| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn wildcard_pattern_matches_any_topic() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe("*", counting_handler(counter.clone())).await;
        bus.publish("routine.triggered", serde_json::json!({})).await;
        bus.publish("session.created", serde_json::json!({})).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prefix_glob_matches_subtopics_only() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe("routine.*", counting_handler(counter.clone()))
            .await;
        bus.publish("routine.triggered", serde_json::json!({})).await;
        bus.publish("session.created", serde_json::json!({})).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_subscribe_is_idempotent() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());
        assert!(bus.subscribe("*", handler.clone()).await);
        assert!(!bus.subscribe("*", handler.clone()).await);
        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_empty_pattern_entry() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter);
        bus.subscribe("routine.*", handler.clone()).await;
        assert!(bus.unsubscribe("routine.*", &handler).await);
        assert!(bus.patterns().await.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_unknown_handler_is_noop() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let a = counting_handler(counter.clone());
        let b = counting_handler(counter);
        bus.subscribe("*", a).await;
        assert!(!bus.unsubscribe("*", &b).await);
        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn one_handler_failing_does_not_block_others() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let failing: Handler = Arc::new(|_t, _d| Box::pin(async { Err("boom".into()) }));
        bus.subscribe("*", failing).await;
        bus.subscribe("*", counting_handler(counter.clone())).await;
        bus.publish("anything", serde_json::json!({})).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nobody.listening", serde_json::json!({})).await;
    }
}
