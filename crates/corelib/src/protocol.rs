//! Membership protocol: the per-node half of join, leave and maintenance.
//!
//! Ring-wide orchestration (choosing a bootstrap contact, updating the
//! membership set, driving stabilization rounds) lives in [`crate::ring::Ring`].
//! Everything here acts on one node and reaches others through its client.

use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::network::RingClient;
use crate::node::{ChordNode, NodeDescriptor};
use crate::ring::position::{between, between_closed_open, between_open};

impl ChordNode {
    /// First node of a new ring: every finger, the successor and the
    /// predecessor point back at this node.
    pub fn bootstrap(&self) {
        let mut state = self.state.write();
        state.fingers.reset(&self.descriptor);
        state.predecessor = Some(self.descriptor.clone());
        info!(node = %self.descriptor, "bootstrapped new ring");
    }

    /// Seeds the finger table through `contact` and splices this node in
    /// front of its new successor.
    pub fn init_finger_table(&self, contact: &NodeDescriptor) -> Result<()> {
        let id = self.id();
        let successor = self
            .client
            .find_successor(contact, self.space.finger_start(id, 0))?;
        if successor.id == id {
            return Err(Error::InvalidOperation(format!(
                "identifier {id} already owned by {successor}"
            )));
        }
        let old_predecessor = self.client.predecessor(&successor)?;
        {
            let mut state = self.state.write();
            state.fingers.set(0, successor.clone());
            state.predecessor = old_predecessor;
        }
        self.client.set_predecessor(&successor, Some(&self.descriptor))?;

        let mut previous = successor;
        for i in 0..(self.space.bits() as usize).saturating_sub(1) {
            let start = self.space.finger_start(id, i + 1);
            let entry = if between_closed_open(id, start, previous.id) {
                previous
            } else {
                self.client.find_successor(contact, start)?
            };
            self.state.write().fingers.set(i + 1, entry.clone());
            previous = entry;
        }
        debug!(node = %self.descriptor, via = %contact, "initialized finger table");
        Ok(())
    }

    /// Offers this node to every node that should now hold it as a finger.
    ///
    /// For finger `i` the candidates are the nodes at or before `id - 2^i`.
    /// The walk starts at the closest one and moves backwards through
    /// predecessors while they accept.
    pub fn update_others(&self) -> Result<()> {
        for i in 0..self.space.bits() as usize {
            let reach = self.space.add(self.space.sub(self.id(), 1u64 << i), 1);
            let mut node = self.find_predecessor(reach)?;
            let mut steps = 0;
            while node != self.descriptor {
                if steps >= self.hop_limit {
                    return Err(Error::RoutingFailure {
                        target: reach,
                        hops: steps,
                    });
                }
                match self
                    .client
                    .update_finger_table(&node, &self.descriptor, i)?
                {
                    Some(previous) => node = previous,
                    None => break,
                }
                steps += 1;
            }
        }
        trace!(node = %self.descriptor, "updated others");
        Ok(())
    }

    /// Takes `candidate` as finger `i` if it lies in `[start_i, finger_i)`.
    ///
    /// Returns this node's predecessor when accepted, or when the entry is
    /// already `candidate`, so the caller can keep walking backwards. `None`
    /// otherwise.
    pub fn update_finger_table(&self, candidate: &NodeDescriptor, i: usize) -> Option<NodeDescriptor> {
        if candidate == &self.descriptor {
            return None;
        }
        let mut state = self.state.write();
        let start = state.fingers.start(self.space, i);
        let current = state.fingers.get(i);
        if current == candidate {
            // Already pointing at it; nodes further back may still need it.
            return state.predecessor.clone();
        }
        if current.id == start || !between_closed_open(start, candidate.id, current.id) {
            return None;
        }
        state.fingers.set(i, candidate.clone());
        trace!(node = %self.descriptor.id, finger = i, to = %candidate.id, "finger updated");
        state.predecessor.clone()
    }

    /// Moves keys after a join.
    ///
    /// Keys in `(predecessor, self]` are copied in from the successor, which
    /// keeps its copy. Keys held here that fall in the successor's range
    /// `(self, successor]` are handed to it and removed locally. Keys outside
    /// both ranges stay where they are: the successor does not own them
    /// either.
    pub fn move_keys(&self) -> Result<()> {
        let successor = self.successor();
        if successor == self.descriptor {
            return Ok(());
        }

        let misplaced = self.keys.range(self.id(), successor.id);
        if !misplaced.is_empty() {
            self.client.put_keys(&successor, misplaced.clone())?;
            let removed = self.keys.remove_unchanged(&misplaced);
            debug!(node = %self.descriptor.id, to = %successor.id, removed, "handed keys to successor");
        }

        if let Some(predecessor) = self.predecessor() {
            let owned = self.client.keys_in(&successor, predecessor.id, self.id())?;
            if !owned.is_empty() {
                debug!(node = %self.descriptor.id, from = %successor.id, count = owned.len(), "took over keys");
                self.keys.extend(owned);
            }
        }
        Ok(())
    }

    /// Adopts the successor's predecessor if it sits between us, then
    /// notifies the successor. Returns true if the successor changed.
    pub fn stabilize(&self) -> Result<bool> {
        let mut changed = false;
        let mut successor = self.successor();

        if !self.client.is_alive(&successor) {
            successor = self.first_live_finger();
            changed |= self.set_successor(successor.clone());
            debug!(node = %self.descriptor.id, to = %successor.id, "successor unreachable, skipped ahead");
        }

        if let Some(x) = self.client.predecessor(&successor)? {
            if between_open(self.id(), x.id, successor.id) && self.client.is_alive(&x) {
                changed |= self.set_successor(x.clone());
                successor = x;
            }
        }

        if successor == self.descriptor {
            self.notify(&self.descriptor.clone());
        } else {
            self.client.notify(&successor, &self.descriptor)?;
        }
        if changed {
            debug!(node = %self.descriptor.id, successor = %successor.id, "stabilized");
        }
        Ok(changed)
    }

    /// `candidate` thinks it may be our predecessor.
    pub fn notify(&self, candidate: &NodeDescriptor) {
        let current = self.predecessor();
        let adopt = match &current {
            None => true,
            Some(p) if p == candidate => false,
            Some(p) if !self.client.is_alive(p) => true,
            Some(p) => between_open(p.id, candidate.id, self.id()),
        };
        if !adopt {
            return;
        }
        let mut state = self.state.write();
        // Someone else may have updated it since we looked.
        if state.predecessor == current {
            state.predecessor = Some(candidate.clone());
            trace!(node = %self.descriptor.id, predecessor = %candidate.id, "predecessor updated");
        }
    }

    /// Recomputes every finger. Returns how many entries changed.
    pub fn fix_fingers(&self) -> Result<usize> {
        let mut changed = 0;
        for i in 0..self.space.bits() as usize {
            let start = self.space.finger_start(self.id(), i);
            let entry = self.find_successor(start)?;
            if self.state.write().fingers.set(i, entry) {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Replaces every reference to `departed`.
    pub fn forget(&self, departed: &NodeDescriptor, replacement: &NodeDescriptor) {
        let mut state = self.state.write();
        let changed = state.fingers.replace_all(departed, replacement);
        if state.predecessor.as_ref() == Some(departed) {
            state.predecessor = None;
        }
        if changed > 0 {
            trace!(node = %self.descriptor.id, departed = %departed.id, changed, "dropped departed node");
        }
    }

    /// The per-node half of a graceful leave: hand the keys in
    /// `(predecessor, self]` to the successor and splice out of the
    /// successor/predecessor chain. Replica copies of other nodes' keys are
    /// dropped.
    ///
    /// Returns the successor the keys went to, or `None` when this node was
    /// alone.
    pub fn depart(&self) -> Result<Option<NodeDescriptor>> {
        let successor = self.successor();
        let predecessor = self.predecessor();

        if successor == self.descriptor {
            self.state.write().predecessor = None;
            info!(node = %self.descriptor, "last node left the ring");
            return Ok(None);
        }

        // Only the owned range moves. Anything else held here is a replica
        // copy that may be older than what its owner holds.
        let entries = match predecessor.as_ref().filter(|p| *p != &self.descriptor) {
            Some(p) => self.keys.range(p.id, self.id()),
            None => self.keys.snapshot().into_iter().collect(),
        };
        let moved = entries.len();
        let dropped = self.keys.len().saturating_sub(moved);
        self.client.put_keys(&successor, entries)?;

        match predecessor.filter(|p| p != &self.descriptor) {
            Some(predecessor) => {
                self.client.set_successor(&predecessor, &successor)?;
                self.client.set_predecessor(&successor, Some(&predecessor))?;
            }
            None => self.client.set_predecessor(&successor, None)?,
        }

        info!(node = %self.descriptor, successor = %successor.id, moved, dropped, "left the ring");
        Ok(Some(successor))
    }

    /// First reachable finger, scanning upwards. Self when none is.
    fn first_live_finger(&self) -> NodeDescriptor {
        let fingers = self.fingers();
        fingers
            .entries()
            .iter()
            .find(|f| *f != &self.descriptor && self.client.is_alive(f))
            .cloned()
            .unwrap_or_else(|| self.descriptor.clone())
    }

    /// True if `key` falls in the range this node owns, `(predecessor, self]`.
    /// A node without a predecessor claims everything.
    pub fn owns(&self, key: crate::id::RingId) -> bool {
        match self.predecessor() {
            Some(p) => between(p.id, key, self.id()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::id::{IdSpace, RingId};
    use crate::network::LocalNetwork;
    use crate::ring::RingBuilder;

    fn detached(network: &Arc<LocalNetwork>, id: u64) -> Arc<ChordNode> {
        let space = IdSpace::new(8).unwrap();
        let client: Arc<dyn RingClient> = network.clone();
        let node = Arc::new(ChordNode::new(
            NodeDescriptor::new(RingId(id), format!("n{id}:1")),
            space,
            64,
            client,
        ));
        network.register(Arc::clone(&node)).unwrap();
        node
    }

    #[test]
    fn test_update_finger_table_walks_past_equal_entry() {
        let network = Arc::new(LocalNetwork::new());
        let a = detached(&network, 10);
        let b = detached(&network, 20);
        let c = detached(&network, 100);
        b.set_predecessor(Some(a.descriptor().clone()));

        // Finger 3 of 20 starts at 28.
        b.state.write().fingers.set(3, c.descriptor().clone());
        assert_eq!(b.update_finger_table(c.descriptor(), 3), Some(a.descriptor().clone()));
        assert_eq!(b.fingers().get(3), c.descriptor());

        // 10 is outside [28, 100): refused.
        assert_eq!(b.update_finger_table(a.descriptor(), 3), None);
        network.clear();
    }

    #[test]
    fn test_update_finger_table_accepts_closer_node() {
        let network = Arc::new(LocalNetwork::new());
        let a = detached(&network, 10);
        let b = detached(&network, 20);
        let c = detached(&network, 100);
        let d = detached(&network, 40);
        b.set_predecessor(Some(a.descriptor().clone()));
        b.state.write().fingers.set(3, c.descriptor().clone());

        assert_eq!(b.update_finger_table(d.descriptor(), 3), Some(a.descriptor().clone()));
        assert_eq!(b.fingers().get(3), d.descriptor());
        network.clear();
    }

    #[test]
    fn test_move_keys_hands_successor_range_only() {
        let ring = RingBuilder::new().build().unwrap();
        for id in [5u64, 200] {
            let node = ring.create_node_with_id(&format!("n{id}:1"), RingId(id)).unwrap();
            ring.join(&node).unwrap();
        }
        let far = ring.node("n200:1").unwrap();
        far.keys().insert(RingId(60), "owned-by-100".into());

        let newcomer = ring.create_node_with_id("n100:1", RingId(100)).unwrap();
        newcomer.keys().insert(RingId(150), "for-200".into());
        newcomer.keys().insert(RingId(3), "for-5".into());
        ring.join(&newcomer).unwrap();

        assert!(!newcomer.keys().contains(RingId(150)));
        assert_eq!(far.keys().get(RingId(150)), Some("for-200".into()));
        // Outside (100, 200]: not handed to the successor.
        assert!(newcomer.keys().contains(RingId(3)));
        assert!(!far.keys().contains(RingId(3)));
        // Own range copied in, successor keeps its copy.
        assert_eq!(newcomer.keys().get(RingId(60)), Some("owned-by-100".into()));
        assert!(far.keys().contains(RingId(60)));
    }

    #[test]
    fn test_depart_hands_only_owned_range() {
        let ring = RingBuilder::new().build().unwrap();
        let mut nodes = Vec::new();
        for id in [10u64, 100, 200] {
            let node = ring.create_node_with_id(&format!("n{id}:1"), RingId(id)).unwrap();
            ring.join(&node).unwrap();
            nodes.push(node);
        }
        let (first, owner) = (&nodes[0], &nodes[1]);
        owner.keys().insert(RingId(70), "newer".into());
        // Stale replica of a key 100 owns.
        first.keys().insert(RingId(70), "older".into());
        first.keys().insert(RingId(250), "mine".into());

        assert_eq!(first.depart().unwrap(), Some(owner.descriptor().clone()));
        assert_eq!(owner.keys().get(RingId(70)), Some("newer".into()));
        assert_eq!(owner.keys().get(RingId(250)), Some("mine".into()));
    }
}
