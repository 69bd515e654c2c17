//! Per-node key store and the routed `put` / `get` built on it.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::id::RingId;
use crate::network::RingClient;
use crate::node::{ChordNode, NodeDescriptor};
use crate::ring::position::between;

/// Key map owned by one node. Every access takes the node's own lock.
#[derive(Debug, Default)]
pub struct KeyStore {
    entries: Mutex<BTreeMap<RingId, String>>,
}

impl KeyStore {
    pub fn get(&self, key: RingId) -> Option<String> {
        self.entries.lock().get(&key).cloned()
    }

    /// Writes `value`, returning the value it replaced.
    pub fn insert(&self, key: RingId, value: String) -> Option<String> {
        self.entries.lock().insert(key, value)
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = (RingId, String)>) {
        self.entries.lock().extend(entries);
    }

    /// Copies every entry whose key lies in the arc `(from, to]`.
    pub fn range(&self, from: RingId, to: RingId) -> Vec<(RingId, String)> {
        self.entries
            .lock()
            .iter()
            .filter(|(k, _)| between(from, **k, to))
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Removes `keys` whose stored value still equals the one given.
    /// Entries rewritten since they were copied are kept.
    pub fn remove_unchanged(&self, keys: &[(RingId, String)]) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for (key, value) in keys {
            if entries.get(key) == Some(value) {
                entries.remove(key);
                removed += 1;
            }
        }
        removed
    }

    pub fn contains(&self, key: RingId) -> bool {
        self.entries.lock().contains_key(&key)
    }

    pub fn snapshot(&self) -> BTreeMap<RingId, String> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ChordNode {
    /// Routes `key` to its owner and writes it there, under the owner's
    /// lock. Returns the key's identifier and the owner.
    pub fn put(&self, key: &str, value: impl Into<String>) -> Result<(RingId, NodeDescriptor)> {
        let id = self.space.hash(key);
        let owner = self.find_successor(id)?;
        self.client.put_key(&owner, id, value.into())?;
        debug!(node = %self.descriptor.id, key = %id, owner = %owner.id, "stored key");
        metrics::counter!("chord_store_total").increment(1);
        Ok((id, owner))
    }

    /// Routes `key` to its owner and reads it there. Hops are traced.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let id = self.space.hash(key);
        let route = self.find_successor_traced(id)?;
        debug!(
            node = %self.descriptor.id,
            key = %id,
            owner = %route.owner.id,
            hops = ?route.hops,
            "lookup routed"
        );
        metrics::counter!("chord_lookup_total").increment(1);
        self.client.get_key(&route.owner, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(keys: &[u64]) -> KeyStore {
        let store = KeyStore::default();
        for k in keys {
            store.insert(RingId(*k), format!("v{k}"));
        }
        store
    }

    #[test]
    fn test_insert_replaces() {
        let store = KeyStore::default();
        assert_eq!(store.insert(RingId(1), "a".into()), None);
        assert_eq!(store.insert(RingId(1), "b".into()), Some("a".into()));
        assert_eq!(store.get(RingId(1)), Some("b".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_range_wraps() {
        let store = store_with(&[1, 5, 100, 250]);
        let ids: Vec<u64> = store.range(RingId(200), RingId(5)).iter().map(|(k, _)| k.0).collect();
        assert_eq!(ids, vec![1, 5, 250]);
        let ids: Vec<u64> = store.range(RingId(1), RingId(100)).iter().map(|(k, _)| k.0).collect();
        assert_eq!(ids, vec![5, 100]);
    }

    #[test]
    fn test_remove_unchanged_keeps_rewritten() {
        let store = store_with(&[1, 2]);
        let copied = store.range(RingId(0), RingId(2));
        store.insert(RingId(2), "newer".into());
        assert_eq!(store.remove_unchanged(&copied), 1);
        assert!(!store.contains(RingId(1)));
        assert_eq!(store.get(RingId(2)), Some("newer".into()));
    }
}
