//! Replicated key/value operations over a Chord ring.
//!
//! `store` writes the owner synchronously and then copies the entry to each
//! replica chosen by the strategy. Replica writes are fire-and-forget: a
//! failure is logged and the entry simply has fewer copies until it is
//! written again. `lookup` reads the owner only.

use std::sync::Arc;

use corelib::{ChordNode, NodeDescriptor, RingClient, RingId};
use tracing::{debug, warn};

use crate::error::Result;
use crate::strategy::{NeighborStrategy, ReplicationStrategy};

/// Where a `store` landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    /// Identifier the key hashed to.
    pub key: RingId,
    pub owner: NodeDescriptor,
    /// Replicas that acknowledged the write.
    pub replicas: Vec<NodeDescriptor>,
}

/// Key/value front end that routes through any member node.
#[derive(Clone)]
pub struct ReplicatedStore {
    strategy: Arc<dyn ReplicationStrategy>,
}

impl ReplicatedStore {
    pub fn new(strategy: impl ReplicationStrategy) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Writes `value` at the key's owner, then best-effort at its replicas.
    pub fn store(&self, node: &ChordNode, key: &str, value: &str) -> Result<StoreReceipt> {
        let (id, owner) = node.put(key, value)?;

        let targets = match self.strategy.replicas(node, &owner) {
            Ok(targets) => targets,
            Err(e) => {
                warn!(key = %id, owner = %owner.id, error = %e, "could not place replicas");
                Vec::new()
            }
        };

        let mut replicas = Vec::with_capacity(targets.len());
        for target in targets {
            match node.client().put_key(&target, id, value.to_string()) {
                Ok(()) => {
                    metrics::counter!("chord_replica_writes_total").increment(1);
                    replicas.push(target);
                }
                Err(e) => {
                    warn!(key = %id, replica = %target, error = %e, "replica write failed");
                }
            }
        }

        debug!(
            key = %id,
            owner = %owner.id,
            replicas = replicas.len(),
            strategy = self.strategy.name(),
            "stored"
        );
        Ok(StoreReceipt {
            key: id,
            owner,
            replicas,
        })
    }

    /// Reads `key` from its owner. `None` when absent.
    pub fn lookup(&self, node: &ChordNode, key: &str) -> Result<Option<String>> {
        Ok(node.get(key)?)
    }
}

impl Default for ReplicatedStore {
    fn default() -> Self {
        Self::new(NeighborStrategy)
    }
}

impl std::fmt::Debug for ReplicatedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedStore")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}
