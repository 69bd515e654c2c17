//! Routing engine: locating the node responsible for an identifier.
//!
//! Lookups are iterative. The querying node drives the walk and asks each hop
//! for its successor and closest preceding finger, so a broken ring shows up
//! as [`Error::RoutingFailure`] after a bounded number of hops instead of
//! unbounded recursion.

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::id::RingId;
use crate::network::RingClient;
use crate::node::{ChordNode, NodeDescriptor};
use crate::ring::position::{between, between_open};

/// Result of a traced lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Node responsible for the identifier.
    pub owner: NodeDescriptor,
    /// Identifiers of the nodes visited, starting with the querying node.
    pub hops: Vec<RingId>,
}

impl ChordNode {
    /// Returns the node that owns `id`.
    pub fn find_successor(&self, id: RingId) -> Result<NodeDescriptor> {
        self.walk(id, None)
    }

    /// Same as [`find_successor`](Self::find_successor), also recording
    /// every node visited. Tracing does not affect the result.
    pub fn find_successor_traced(&self, id: RingId) -> Result<Route> {
        let mut hops = Vec::new();
        let owner = self.walk(id, Some(&mut hops))?;
        metrics::histogram!("chord_route_hops").record(hops.len() as f64);
        Ok(Route { owner, hops })
    }

    fn walk(&self, id: RingId, mut hops: Option<&mut Vec<RingId>>) -> Result<NodeDescriptor> {
        let mut current = self.descriptor.clone();
        // Successor of the last node that answered; where to go when the
        // next hop turns out to be gone.
        let mut fallback: Option<NodeDescriptor> = None;

        for _ in 0..self.hop_limit {
            if let Some(hops) = hops.as_deref_mut() {
                hops.push(current.id);
            }
            trace!(target_id = %id, hop = %current.id, "routing hop");

            let successor = match self.client.successor(&current) {
                Ok(successor) => successor,
                Err(Error::Unreachable(addr)) => match fallback.take() {
                    Some(next) if next != current => {
                        debug!(target_id = %id, unreachable = %addr, via = %next.id, "rerouting around unreachable hop");
                        current = next;
                        continue;
                    }
                    _ => return Err(Error::Unreachable(addr)),
                },
                Err(e) => return Err(e),
            };

            if successor == current {
                return Ok(current);
            }
            if between(current.id, id, successor.id) {
                return Ok(successor);
            }

            let next = self.client.closest_preceding_node(&current, id)?;
            fallback = Some(successor.clone());
            // No finger strictly between: step to the successor so the walk
            // always makes progress.
            current = if next == current { successor } else { next };
        }

        Err(Error::RoutingFailure {
            target: id,
            hops: self.hop_limit,
        })
    }

    /// Highest finger strictly inside `(self, id)` that is still reachable,
    /// or self when none qualifies.
    pub fn closest_preceding_node(&self, id: RingId) -> NodeDescriptor {
        let fingers = self.fingers();
        for (_, finger) in fingers.iter_rev() {
            if between_open(self.id(), finger.id, id) && self.client.is_alive(finger) {
                return finger.clone();
            }
        }
        self.descriptor.clone()
    }

    /// Node `n` such that `id` lies in `(n, n.successor]`.
    pub fn find_predecessor(&self, id: RingId) -> Result<NodeDescriptor> {
        let mut node = self.descriptor.clone();
        for _ in 0..self.hop_limit {
            let successor = self.client.successor(&node)?;
            if between(node.id, id, successor.id) {
                return Ok(node);
            }
            let next = self.client.closest_preceding_node(&node, id)?;
            node = if next == node { successor } else { next };
        }
        Err(Error::RoutingFailure {
            target: id,
            hops: self.hop_limit,
        })
    }
}
