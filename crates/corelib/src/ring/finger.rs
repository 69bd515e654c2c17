//! Per-node finger table.
//!
//! Entry `i` names the node responsible for `(id + 2^i) mod 2^M`. Entry 0 is
//! the node's successor; there is no separate successor field, so the two can
//! never disagree.

use serde::Serialize;

use crate::id::{IdSpace, RingId};
use crate::node::NodeDescriptor;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FingerTable {
    owner: RingId,
    entries: Vec<NodeDescriptor>,
}

impl FingerTable {
    /// A table with every entry pointing back at `owner`.
    pub fn new(space: IdSpace, owner: &NodeDescriptor) -> Self {
        Self {
            owner: owner.id,
            entries: vec![owner.clone(); space.bits() as usize],
        }
    }

    /// Number of entries (`M`).
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry 0.
    #[inline]
    pub fn successor(&self) -> &NodeDescriptor {
        &self.entries[0]
    }

    #[inline]
    pub fn get(&self, i: usize) -> &NodeDescriptor {
        &self.entries[i]
    }

    /// Replaces entry `i`. Returns true when the entry changed.
    pub fn set(&mut self, i: usize, node: NodeDescriptor) -> bool {
        if self.entries[i] == node {
            return false;
        }
        self.entries[i] = node;
        true
    }

    /// Points every entry back at the owner.
    pub fn reset(&mut self, owner: &NodeDescriptor) {
        for entry in &mut self.entries {
            *entry = owner.clone();
        }
    }

    /// Entries from the highest index down, paired with their index.
    pub fn iter_rev(&self) -> impl Iterator<Item = (usize, &NodeDescriptor)> {
        self.entries.iter().enumerate().rev()
    }

    pub fn entries(&self) -> &[NodeDescriptor] {
        &self.entries
    }

    /// Start identifier of entry `i`.
    pub fn start(&self, space: IdSpace, i: usize) -> RingId {
        space.finger_start(self.owner, i)
    }

    /// Replaces every entry naming `departed` with `replacement`.
    /// Returns how many entries changed.
    pub fn replace_all(&mut self, departed: &NodeDescriptor, replacement: &NodeDescriptor) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            if entry == departed {
                *entry = replacement.clone();
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: u64) -> NodeDescriptor {
        NodeDescriptor::new(RingId(id), format!("node-{id}"))
    }

    #[test]
    fn test_new_points_at_owner() {
        let space = IdSpace::new(8).unwrap();
        let table = FingerTable::new(space, &desc(5));
        assert_eq!(table.len(), 8);
        assert!(table.entries().iter().all(|e| e.id == RingId(5)));
        assert_eq!(table.successor(), &desc(5));
    }

    #[test]
    fn test_set_reports_change() {
        let space = IdSpace::new(4).unwrap();
        let mut table = FingerTable::new(space, &desc(1));
        assert!(table.set(0, desc(3)));
        assert!(!table.set(0, desc(3)));
        assert_eq!(table.successor(), &desc(3));
    }

    #[test]
    fn test_starts() {
        let space = IdSpace::new(3).unwrap();
        let table = FingerTable::new(space, &desc(6));
        let starts: Vec<_> = (0..3).map(|i| table.start(space, i).0).collect();
        assert_eq!(starts, vec![7, 0, 2]);
    }

    #[test]
    fn test_replace_all() {
        let space = IdSpace::new(3).unwrap();
        let mut table = FingerTable::new(space, &desc(1));
        table.set(0, desc(2));
        table.set(1, desc(4));
        table.set(2, desc(4));
        assert_eq!(table.replace_all(&desc(4), &desc(6)), 2);
        assert_eq!(table.get(2), &desc(6));
        assert_eq!(table.get(0), &desc(2));
    }
}
