//! Client boundary between ring members.
//!
//! Nodes never touch each other directly. Every cross-node call names its
//! target by [`NodeDescriptor`] and goes through a [`RingClient`], so the
//! routing and membership code is the same whether members share an address
//! space or sit behind an RPC layer.
//!
//! [`LocalNetwork`] is the in-process implementation: an address registry of
//! live nodes. A node is reachable from the moment it is registered until it
//! is deregistered on leave.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::id::RingId;
use crate::node::{ChordNode, NodeDescriptor, NodeSnapshot};

/// Calls one ring member can make on another.
///
/// Implementations must be thread-safe (Send + Sync): routing runs on
/// arbitrary caller threads while maintenance runs in the background.
pub trait RingClient: Send + Sync + 'static {
    /// True if `node` can currently be reached.
    fn is_alive(&self, node: &NodeDescriptor) -> bool;

    fn successor(&self, node: &NodeDescriptor) -> Result<NodeDescriptor>;

    fn predecessor(&self, node: &NodeDescriptor) -> Result<Option<NodeDescriptor>>;

    fn set_successor(&self, node: &NodeDescriptor, successor: &NodeDescriptor) -> Result<()>;

    fn set_predecessor(
        &self,
        node: &NodeDescriptor,
        predecessor: Option<&NodeDescriptor>,
    ) -> Result<()>;

    fn closest_preceding_node(&self, node: &NodeDescriptor, id: RingId) -> Result<NodeDescriptor>;

    /// Runs a full routing walk starting at `node`.
    fn find_successor(&self, node: &NodeDescriptor, id: RingId) -> Result<NodeDescriptor>;

    fn notify(&self, node: &NodeDescriptor, candidate: &NodeDescriptor) -> Result<()>;

    /// Offers `candidate` as finger `i` of `node`. Returns the node to offer
    /// it to next (`node`'s predecessor) when accepted, `None` when refused.
    fn update_finger_table(
        &self,
        node: &NodeDescriptor,
        candidate: &NodeDescriptor,
        i: usize,
    ) -> Result<Option<NodeDescriptor>>;

    /// Rewrites every reference `node` holds to `departed` as `replacement`.
    fn forget(
        &self,
        node: &NodeDescriptor,
        departed: &NodeDescriptor,
        replacement: &NodeDescriptor,
    ) -> Result<()>;

    fn get_key(&self, node: &NodeDescriptor, key: RingId) -> Result<Option<String>>;

    fn put_key(&self, node: &NodeDescriptor, key: RingId, value: String) -> Result<()>;

    fn put_keys(&self, node: &NodeDescriptor, entries: Vec<(RingId, String)>) -> Result<()>;

    /// Copies the entries of `node` whose keys lie in `(from, to]`.
    fn keys_in(&self, node: &NodeDescriptor, from: RingId, to: RingId) -> Result<Vec<(RingId, String)>>;

    // Maintenance calls issued by the stabilization coordinator.

    /// Returns true if the successor changed.
    fn stabilize(&self, node: &NodeDescriptor) -> Result<bool>;

    /// Returns how many finger entries changed.
    fn fix_fingers(&self, node: &NodeDescriptor) -> Result<usize>;

    fn update_others(&self, node: &NodeDescriptor) -> Result<()>;

    fn snapshot(&self, node: &NodeDescriptor) -> Result<NodeSnapshot>;
}

/// In-process network: every registered node, by address.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: DashMap<String, Arc<ChordNode>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `node` reachable. Fails if its address is taken.
    pub fn register(&self, node: Arc<ChordNode>) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.nodes.entry(node.address().to_string()) {
            Entry::Occupied(_) => Err(Error::InvalidOperation(format!(
                "address {} already registered",
                node.address()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }

    pub fn deregister(&self, address: &str) -> Option<Arc<ChordNode>> {
        self.nodes.remove(address).map(|(_, node)| node)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops every registration. Nodes hold the network through their client,
    /// so this breaks the reference cycle when a ring is torn down.
    pub fn clear(&self) {
        self.nodes.clear();
    }

    /// Looks up the live node behind `node`. The returned `Arc` is cloned out
    /// of the map so no shard lock is held while the caller uses it.
    pub fn resolve(&self, node: &NodeDescriptor) -> Result<Arc<ChordNode>> {
        let found = self
            .nodes
            .get(&node.address)
            .map(|entry| Arc::clone(entry.value()));
        match found {
            Some(target) if target.id() == node.id => Ok(target),
            _ => Err(Error::Unreachable(node.to_string())),
        }
    }
}

impl RingClient for LocalNetwork {
    fn is_alive(&self, node: &NodeDescriptor) -> bool {
        self.resolve(node).is_ok()
    }

    fn successor(&self, node: &NodeDescriptor) -> Result<NodeDescriptor> {
        Ok(self.resolve(node)?.successor())
    }

    fn predecessor(&self, node: &NodeDescriptor) -> Result<Option<NodeDescriptor>> {
        Ok(self.resolve(node)?.predecessor())
    }

    fn set_successor(&self, node: &NodeDescriptor, successor: &NodeDescriptor) -> Result<()> {
        self.resolve(node)?.set_successor(successor.clone());
        Ok(())
    }

    fn set_predecessor(
        &self,
        node: &NodeDescriptor,
        predecessor: Option<&NodeDescriptor>,
    ) -> Result<()> {
        self.resolve(node)?.set_predecessor(predecessor.cloned());
        Ok(())
    }

    fn closest_preceding_node(&self, node: &NodeDescriptor, id: RingId) -> Result<NodeDescriptor> {
        Ok(self.resolve(node)?.closest_preceding_node(id))
    }

    fn find_successor(&self, node: &NodeDescriptor, id: RingId) -> Result<NodeDescriptor> {
        self.resolve(node)?.find_successor(id)
    }

    fn notify(&self, node: &NodeDescriptor, candidate: &NodeDescriptor) -> Result<()> {
        self.resolve(node)?.notify(candidate);
        Ok(())
    }

    fn update_finger_table(
        &self,
        node: &NodeDescriptor,
        candidate: &NodeDescriptor,
        i: usize,
    ) -> Result<Option<NodeDescriptor>> {
        Ok(self.resolve(node)?.update_finger_table(candidate, i))
    }

    fn forget(
        &self,
        node: &NodeDescriptor,
        departed: &NodeDescriptor,
        replacement: &NodeDescriptor,
    ) -> Result<()> {
        self.resolve(node)?.forget(departed, replacement);
        Ok(())
    }

    fn get_key(&self, node: &NodeDescriptor, key: RingId) -> Result<Option<String>> {
        Ok(self.resolve(node)?.keys().get(key))
    }

    fn put_key(&self, node: &NodeDescriptor, key: RingId, value: String) -> Result<()> {
        self.resolve(node)?.keys().insert(key, value);
        Ok(())
    }

    fn put_keys(&self, node: &NodeDescriptor, entries: Vec<(RingId, String)>) -> Result<()> {
        self.resolve(node)?.keys().extend(entries);
        Ok(())
    }

    fn keys_in(&self, node: &NodeDescriptor, from: RingId, to: RingId) -> Result<Vec<(RingId, String)>> {
        Ok(self.resolve(node)?.keys().range(from, to))
    }

    fn stabilize(&self, node: &NodeDescriptor) -> Result<bool> {
        self.resolve(node)?.stabilize()
    }

    fn fix_fingers(&self, node: &NodeDescriptor) -> Result<usize> {
        self.resolve(node)?.fix_fingers()
    }

    fn update_others(&self, node: &NodeDescriptor) -> Result<()> {
        self.resolve(node)?.update_others()
    }

    fn snapshot(&self, node: &NodeDescriptor) -> Result<NodeSnapshot> {
        Ok(self.resolve(node)?.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdSpace;

    fn node(network: &Arc<LocalNetwork>, id: u64, address: &str) -> Arc<ChordNode> {
        let client: Arc<dyn RingClient> = network.clone();
        let space = IdSpace::new(8).unwrap();
        Arc::new(ChordNode::new(
            NodeDescriptor::new(RingId(id), address),
            space,
            64,
            client,
        ))
    }

    #[test]
    fn test_register_and_resolve() {
        let network = Arc::new(LocalNetwork::new());
        let a = node(&network, 10, "127.0.0.1:8000");
        network.register(Arc::clone(&a)).unwrap();
        assert!(network.is_alive(a.descriptor()));
        assert_eq!(network.successor(a.descriptor()).unwrap(), *a.descriptor());
        network.clear();
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let network = Arc::new(LocalNetwork::new());
        network.register(node(&network, 10, "127.0.0.1:8000")).unwrap();
        let err = network.register(node(&network, 11, "127.0.0.1:8000")).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        network.clear();
    }

    #[test]
    fn test_stale_descriptor_is_unreachable() {
        let network = Arc::new(LocalNetwork::new());
        let a = node(&network, 10, "127.0.0.1:8000");
        network.register(Arc::clone(&a)).unwrap();

        // Same address, different identifier.
        let stale = NodeDescriptor::new(RingId(99), "127.0.0.1:8000");
        assert!(matches!(network.successor(&stale), Err(Error::Unreachable(_))));

        network.deregister(a.address());
        assert!(!network.is_alive(a.descriptor()));
        assert!(matches!(
            network.get_key(a.descriptor(), RingId(1)),
            Err(Error::Unreachable(_))
        ));
    }
}
