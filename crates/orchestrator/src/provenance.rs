//! Provenance store: every piece of data flowing through a task is
//! registered here by id, with the trust-gate predicate the orchestrator
//! consults before letting a tool_call touch anything derived from
//! untrusted data.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use sentinel_domain::data::{DataSource, TaggedData, TrustLevel};
use uuid::Uuid;

#[derive(Default)]
pub struct ProvenanceStore {
    data: RwLock<HashMap<Uuid, TaggedData>>,
}

impl ProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a new `TaggedData` and registers it.
    pub fn create_tagged_data(
        &self,
        content: impl Into<String>,
        source: DataSource,
        trust_level: TrustLevel,
        originated_from: impl Into<String>,
        parent_ids: Vec<Uuid>,
    ) -> TaggedData {
        let tagged = TaggedData::new(content, source, trust_level, originated_from, parent_ids);
        self.insert(tagged.clone());
        tagged
    }

    /// Registers data that was already constructed elsewhere (the scan
    /// pipeline and tool executor both mint their own `TaggedData`).
    pub fn insert(&self, data: TaggedData) {
        self.data.write().insert(data.id, data);
    }

    pub fn get_tagged_data(&self, id: Uuid) -> Option<TaggedData> {
        self.data.read().get(&id).cloned()
    }

    /// True iff `id` and every ancestor transitively reachable via
    /// `parent_ids` carries `trust_level == Trusted`. An id this store has
    /// never seen fails closed (the gate rejects unknown provenance rather
    /// than assuming trust).
    pub fn is_trust_safe_for_execution(&self, id: Uuid) -> bool {
        let data = self.data.read();
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(tagged) = data.get(&current) else {
                return false;
            };
            if tagged.trust_level != TrustLevel::Trusted {
                return false;
            }
            stack.extend(tagged.parent_ids.iter().copied());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tagged_data_round_trips_through_get() {
        let store = ProvenanceStore::new();
        let tagged = store.create_tagged_data("hi", DataSource::User, TrustLevel::Trusted, "user", vec![]);
        let fetched = store.get_tagged_data(tagged.id).unwrap();
        assert_eq!(fetched.content, "hi");
    }

    #[test]
    fn trusted_chain_is_safe() {
        let store = ProvenanceStore::new();
        let root = store.create_tagged_data("r", DataSource::User, TrustLevel::Trusted, "user", vec![]);
        let child = store.create_tagged_data("c", DataSource::Tool, TrustLevel::Trusted, "file_read", vec![root.id]);
        assert!(store.is_trust_safe_for_execution(child.id));
    }

    #[test]
    fn untrusted_ancestor_taints_descendant() {
        let store = ProvenanceStore::new();
        let worker_out = store.create_tagged_data("w", DataSource::Worker, TrustLevel::Trusted, "worker", vec![]);
        assert_eq!(worker_out.trust_level, TrustLevel::Untrusted);
        let child = store.create_tagged_data(
            "c",
            DataSource::Tool,
            TrustLevel::Trusted,
            "file_write",
            vec![worker_out.id],
        );
        assert!(!store.is_trust_safe_for_execution(child.id));
    }

    #[test]
    fn unknown_id_fails_closed() {
        let store = ProvenanceStore::new();
        assert!(!store.is_trust_safe_for_execution(Uuid::new_v4()));
    }

    #[test]
    fn direct_untrusted_data_is_unsafe() {
        let store = ProvenanceStore::new();
        let tagged = store.create_tagged_data("x", DataSource::Tool, TrustLevel::Untrusted, "network_fetch", vec![]);
        assert!(!store.is_trust_safe_for_execution(tagged.id));
    }
}
