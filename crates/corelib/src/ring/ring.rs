//! The ring coordinator.
//!
//! [`Ring`] owns the membership set (the nodes currently joined), the
//! in-process network that makes nodes reachable, and the ring-wide
//! maintenance cycle. Joins and leaves are serialized by a coordinator lock;
//! routing, stores and lookups are not.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RingConfig;
use crate::error::{Error, Result};
use crate::id::{IdSpace, RingId};
use crate::network::{LocalNetwork, RingClient};
use crate::node::{ChordNode, NodeDescriptor, NodeSnapshot};

/// Outcome of one or more maintenance rounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Rounds executed.
    pub rounds: usize,
    /// Successor and finger entries that changed.
    pub changed: usize,
    /// Per-node maintenance calls that failed. They are retried next round.
    pub failures: usize,
}

impl RoundReport {
    fn absorb(&mut self, other: RoundReport) {
        self.rounds += other.rounds;
        self.changed += other.changed;
        self.failures += other.failures;
    }

    /// True when nothing changed and nothing failed.
    pub fn is_quiet(&self) -> bool {
        self.changed == 0 && self.failures == 0
    }
}

/// A Chord ring running inside this process.
pub struct Ring {
    config: RingConfig,
    space: IdSpace,
    network: Arc<LocalNetwork>,
    members: RwLock<Vec<NodeDescriptor>>,
    topology: Mutex<()>,
}

impl Ring {
    /// Creates an empty ring with the default config.
    pub fn new() -> Self {
        RingBuilder::new()
            .build()
            .unwrap_or_else(|_| unreachable!("default config is valid"))
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    pub fn space(&self) -> IdSpace {
        self.space
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }

    /// Creates a node identified by the hash of its address and makes it
    /// reachable. The node is not a member until [`join`](Self::join).
    pub fn create_node(&self, address: &str) -> Result<Arc<ChordNode>> {
        self.create_node_with_id(address, self.space.hash(address))
    }

    /// Creates a node at an explicit identifier.
    pub fn create_node_with_id(&self, address: &str, id: RingId) -> Result<Arc<ChordNode>> {
        if id.0 >= self.space.size() {
            return Err(Error::InvalidOperation(format!(
                "identifier {id} outside ring of size {}",
                self.space.size()
            )));
        }
        let client: Arc<dyn RingClient> = self.network.clone();
        let node = Arc::new(ChordNode::new(
            NodeDescriptor::new(id, address),
            self.space,
            self.config.hop_limit(),
            client,
        ));
        self.network.register(Arc::clone(&node))?;
        info!(node = %node.descriptor(), "new node");
        Ok(node)
    }

    /// Looks up a live node by address.
    pub fn node(&self, address: &str) -> Option<Arc<ChordNode>> {
        let members = self.members.read();
        let descriptor = members.iter().find(|m| m.address == address)?;
        self.network.resolve(descriptor).ok()
    }

    /// Descriptors of every joined node, in join order.
    pub fn members(&self) -> Vec<NodeDescriptor> {
        self.members.read().clone()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Adds `node` to the ring.
    ///
    /// The first node bootstraps a new ring. Later nodes seed their fingers
    /// from the first live member, splice in, update other nodes' fingers and
    /// take over their keys. The ring is then stabilized for
    /// `stabilization_rounds` rounds.
    pub fn join(&self, node: &ChordNode) -> Result<()> {
        let _topology = self.topology.lock();
        let descriptor = node.descriptor().clone();

        if !self.network.is_alive(&descriptor) {
            return Err(Error::InvalidOperation(format!(
                "{descriptor} is not reachable; create a new node to rejoin"
            )));
        }
        let contact = {
            let members = self.members.read();
            if let Some(existing) = members.iter().find(|m| m.id == descriptor.id) {
                return Err(Error::InvalidOperation(format!(
                    "identifier {} already taken by {existing}",
                    descriptor.id
                )));
            }
            members.iter().find(|m| self.network.is_alive(m)).cloned()
        };

        match contact {
            None => node.bootstrap(),
            Some(contact) => {
                node.init_finger_table(&contact)?;
                if let Err(e) = node.update_others() {
                    warn!(node = %descriptor, error = %e, "update_others failed, leaving repair to stabilization");
                }
                node.move_keys()?;
            }
        }

        self.members.write().push(descriptor.clone());
        let report = self.converge(self.config.stabilization_rounds);
        info!(node = %descriptor, members = self.len(), changed = report.changed, "node joined");
        Ok(())
    }

    /// Removes `node` from the ring.
    ///
    /// Its keys move to its successor, it is spliced out of the chain and
    /// deregistered, every remaining member drops references to it and
    /// re-runs `update_others`, and the ring is stabilized. Leaving twice is
    /// rejected.
    pub fn leave(&self, node: &ChordNode) -> Result<()> {
        let _topology = self.topology.lock();
        let descriptor = node.descriptor().clone();

        if !self.members.read().contains(&descriptor) {
            return Err(Error::InvalidOperation(format!("{descriptor} is not a member")));
        }

        let successor = node.depart()?;
        self.members.write().retain(|m| m != &descriptor);
        self.network.deregister(&descriptor.address);

        let remaining = self.members();
        if let Some(successor) = successor {
            for member in &remaining {
                if let Err(e) = self.network.forget(member, &descriptor, &successor) {
                    warn!(member = %member, error = %e, "failed to drop departed node");
                }
            }
        }
        for member in &remaining {
            if let Err(e) = self.network.update_others(member) {
                warn!(member = %member, error = %e, "update_others failed after leave");
            }
        }
        let report = self.converge(self.config.stabilization_rounds);
        info!(node = %descriptor, members = remaining.len(), changed = report.changed, "node left");
        Ok(())
    }

    /// One ring-wide maintenance round: every member stabilizes, then every
    /// member fixes its fingers. Failures are logged and counted, never
    /// returned; the next round retries them.
    pub fn stabilize_round(&self) -> RoundReport {
        let members = self.members();
        let mut report = RoundReport {
            rounds: 1,
            ..RoundReport::default()
        };

        for member in &members {
            match self.network.stabilize(member) {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(e) => {
                    debug!(member = %member, error = %e, "stabilize failed");
                    report.failures += 1;
                }
            }
        }
        for member in &members {
            match self.network.fix_fingers(member) {
                Ok(changed) => report.changed += changed,
                Err(e) => {
                    debug!(member = %member, error = %e, "fix_fingers failed");
                    report.failures += 1;
                }
            }
        }
        metrics::counter!("chord_maintenance_rounds_total").increment(1);
        report
    }

    /// Runs `rounds` maintenance rounds.
    pub fn converge(&self, rounds: usize) -> RoundReport {
        let mut total = RoundReport::default();
        for _ in 0..rounds {
            total.absorb(self.stabilize_round());
        }
        total
    }

    /// Runs maintenance rounds until one changes nothing, at most
    /// `max_rounds`. Returns the rounds run and whether the ring settled.
    pub fn converge_until_quiet(&self, max_rounds: usize) -> (RoundReport, bool) {
        let mut total = RoundReport::default();
        for _ in 0..max_rounds {
            let round = self.stabilize_round();
            total.absorb(round);
            if round.is_quiet() {
                return (total, true);
            }
        }
        (total, false)
    }

    /// Follows successor pointers from the first member until the walk
    /// returns to it, or one step more than there are members.
    ///
    /// On a converged ring the result lists every member exactly once, in
    /// ring order.
    pub fn successor_cycle(&self) -> Result<Vec<RingId>> {
        let members = self.members();
        let Some(start) = members.first().cloned() else {
            return Ok(Vec::new());
        };

        let mut cycle = vec![start.id];
        let mut current = self.network.successor(&start)?;
        while current != start && cycle.len() <= members.len() {
            cycle.push(current.id);
            current = self.network.successor(&current)?;
        }
        Ok(cycle)
    }

    /// True if successor pointers form a single cycle through every member
    /// and each member is its successor's predecessor.
    pub fn is_consistent(&self) -> bool {
        let members = self.members();
        let Ok(cycle) = self.successor_cycle() else {
            return false;
        };
        if cycle.len() != members.len() {
            return false;
        }
        let mut ids: Vec<_> = members.iter().map(|m| m.id).collect();
        ids.sort();
        let mut walked = cycle.clone();
        walked.sort();
        if ids != walked {
            return false;
        }
        members.iter().all(|m| {
            self.network
                .successor(m)
                .and_then(|s| self.network.predecessor(&s))
                .map(|p| p.as_ref() == Some(m))
                .unwrap_or(false)
        })
    }

    /// Snapshot of every member.
    pub fn dump_state(&self) -> Vec<NodeSnapshot> {
        self.members()
            .iter()
            .filter_map(|m| self.network.snapshot(m).ok())
            .collect()
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        self.network.clear();
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("config", &self.config)
            .field("members", &self.members.read().len())
            .finish()
    }
}

/// Builder for [`Ring`].
///
/// # Example
/// ```rust
/// use corelib::ring::RingBuilder;
///
/// let ring = RingBuilder::new()
///     .with_id_bits(8)
///     .with_stabilization_rounds(3)
///     .build()
///     .unwrap();
/// assert!(ring.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RingBuilder {
    config: RingConfig,
}

impl RingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: RingConfig) -> Self {
        Self { config }
    }

    /// Identifier width `M`.
    pub fn with_id_bits(mut self, bits: u8) -> Self {
        self.config.id_bits = bits;
        self
    }

    pub fn with_stabilization_rounds(mut self, rounds: usize) -> Self {
        self.config.stabilization_rounds = rounds;
        self
    }

    pub fn with_max_hops(mut self, hops: usize) -> Self {
        self.config.max_hops = hops;
        self
    }

    pub fn with_maintenance_interval_ms(mut self, ms: u64) -> Self {
        self.config.maintenance_interval_ms = ms;
        self
    }

    pub fn build(self) -> Result<Ring> {
        let space = self.config.validate()?;
        Ok(Ring {
            config: self.config,
            space,
            network: Arc::new(LocalNetwork::new()),
            members: RwLock::new(Vec::new()),
            topology: Mutex::new(()),
        })
    }
}
