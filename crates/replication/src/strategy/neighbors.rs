//! Neighbor replication: a key lives on its owner, the owner's successor and
//! the owner's predecessor.
//!
//! On leave the departing node's keys move to its successor, which already
//! holds a copy. Rings of one or two nodes yield fewer distinct replicas.

use corelib::{ChordNode, NodeDescriptor, RingClient};

use crate::strategy::ReplicationStrategy;

#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborStrategy;

impl NeighborStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ReplicationStrategy for NeighborStrategy {
    fn replication_factor(&self) -> usize {
        3
    }

    fn replicas(&self, via: &ChordNode, owner: &NodeDescriptor) -> corelib::Result<Vec<NodeDescriptor>> {
        let client = via.client();
        let successor = client.successor(owner)?;
        let predecessor = client.predecessor(owner)?;

        let mut replicas = Vec::with_capacity(2);
        for candidate in std::iter::once(successor).chain(predecessor) {
            if &candidate != owner && !replicas.contains(&candidate) {
                replicas.push(candidate);
            }
        }
        Ok(replicas)
    }

    fn name(&self) -> &'static str {
        "NeighborStrategy"
    }
}
