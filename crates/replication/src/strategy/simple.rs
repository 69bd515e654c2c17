//! Simple replication strategy.
//!
//! Places N copies sequentially around the ring: the owner, then the next
//! N-1 distinct nodes reached by following successor pointers.
//!
//! # Algorithm
//!
//! 1. Start at the owner (the key's successor)
//! 2. Follow successor pointers, collecting unseen nodes
//! 3. Stop after N-1 replicas or when the walk returns to the owner
//!
//! # Performance
//!
//! - **Time**: O(r) successor queries, r = replication factor
//! - **Space**: O(r)
//!
//! # Limitations
//!
//! - Replicas follow the ring's current successor pointers; during
//!   stabilization they may briefly differ from the converged placement

use corelib::{ChordNode, NodeDescriptor, RingClient};

use crate::error::{ReplicationError, Result};
use crate::strategy::ReplicationStrategy;

/// N copies placed on consecutive ring nodes.
///
/// # Example
///
/// ```rust
/// use replication::{ReplicationStrategy, SimpleStrategy};
///
/// let strategy = SimpleStrategy::new(3).unwrap(); // owner + 2 replicas
/// assert_eq!(strategy.replication_factor(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct SimpleStrategy {
    /// Number of copies, owner included.
    replication_factor: usize,
}

impl SimpleStrategy {
    /// Creates a strategy keeping `replication_factor` copies.
    ///
    /// - 1: no replication (single copy)
    /// - 3: owner + 2 successors
    pub fn new(replication_factor: usize) -> Result<Self> {
        if replication_factor == 0 {
            return Err(ReplicationError::InvalidFactor(replication_factor));
        }
        Ok(Self { replication_factor })
    }
}

impl Default for SimpleStrategy {
    fn default() -> Self {
        Self {
            replication_factor: 3,
        }
    }
}

impl ReplicationStrategy for SimpleStrategy {
    fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    fn replicas(&self, via: &ChordNode, owner: &NodeDescriptor) -> corelib::Result<Vec<NodeDescriptor>> {
        let wanted = self.replication_factor - 1;
        let mut replicas: Vec<NodeDescriptor> = Vec::with_capacity(wanted);
        let mut current = owner.clone();

        while replicas.len() < wanted {
            current = via.client().successor(&current)?;
            // Back at the owner or looping: the ring has no more nodes.
            if &current == owner || replicas.contains(&current) {
                break;
            }
            replicas.push(current.clone());
        }
        Ok(replicas)
    }

    fn name(&self) -> &'static str {
        "SimpleStrategy"
    }
}
