//! Node abstractions for the Chord ring.
//!
//! A [`NodeDescriptor`] is the serializable identity of a ring member: its
//! identifier and address. Every cross-node reference (successor,
//! predecessor, fingers, the membership set) is a descriptor, never a pointer
//! to another node. All calls into another node go through the node's
//! [`RingClient`].
//!
//! A [`ChordNode`] owns its routing state and its key store. Routing state is
//! behind one `RwLock`, keys behind their own `Mutex`; the two are never held
//! together, and neither is held across a call through the client.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::id::{IdSpace, RingId};
use crate::network::RingClient;
use crate::ring::finger::FingerTable;
use crate::store::KeyStore;

/// Identity of a ring member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: RingId,
    /// Opaque endpoint (`host:port`). Used for hashing and addressing only.
    pub address: String,
}

impl NodeDescriptor {
    pub fn new(id: RingId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Mutable routing state of a node.
#[derive(Clone, Debug)]
pub(crate) struct RoutingState {
    pub(crate) fingers: FingerTable,
    pub(crate) predecessor: Option<NodeDescriptor>,
}

/// Diagnostic view of a node. Not used for correctness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: RingId,
    pub address: String,
    pub successor: RingId,
    pub predecessor: Option<RingId>,
    pub fingers: Vec<RingId>,
    pub keys: BTreeMap<RingId, String>,
}

/// A ring member.
pub struct ChordNode {
    pub(crate) descriptor: NodeDescriptor,
    pub(crate) space: IdSpace,
    pub(crate) hop_limit: usize,
    pub(crate) state: RwLock<RoutingState>,
    pub(crate) keys: KeyStore,
    pub(crate) client: Arc<dyn RingClient>,
}

impl ChordNode {
    /// Creates a node whose fingers all point back at itself. It has no
    /// predecessor until it joins.
    pub fn new(
        descriptor: NodeDescriptor,
        space: IdSpace,
        hop_limit: usize,
        client: Arc<dyn RingClient>,
    ) -> Self {
        let fingers = FingerTable::new(space, &descriptor);
        tracing::debug!(node = %descriptor, "created node");
        Self {
            descriptor,
            space,
            hop_limit,
            state: RwLock::new(RoutingState {
                fingers,
                predecessor: None,
            }),
            keys: KeyStore::default(),
            client,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn id(&self) -> RingId {
        self.descriptor.id
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    #[inline]
    pub fn space(&self) -> IdSpace {
        self.space
    }

    /// The client this node uses to reach other nodes.
    pub fn client(&self) -> &Arc<dyn RingClient> {
        &self.client
    }

    pub fn successor(&self) -> NodeDescriptor {
        self.state.read().fingers.successor().clone()
    }

    pub fn predecessor(&self) -> Option<NodeDescriptor> {
        self.state.read().predecessor.clone()
    }

    pub fn fingers(&self) -> FingerTable {
        self.state.read().fingers.clone()
    }

    /// Points finger 0, and thereby the successor, at `node`.
    pub fn set_successor(&self, node: NodeDescriptor) -> bool {
        self.state.write().fingers.set(0, node)
    }

    pub fn set_predecessor(&self, node: Option<NodeDescriptor>) -> bool {
        let mut state = self.state.write();
        if state.predecessor == node {
            return false;
        }
        state.predecessor = node;
        true
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// True when this node is its own successor.
    pub fn is_alone(&self) -> bool {
        self.state.read().fingers.successor() == &self.descriptor
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.read().clone();
        NodeSnapshot {
            id: self.id(),
            address: self.descriptor.address.clone(),
            successor: state.fingers.successor().id,
            predecessor: state.predecessor.as_ref().map(|p| p.id),
            fingers: state.fingers.entries().iter().map(|f| f.id).collect(),
            keys: self.keys.snapshot(),
        }
    }
}

impl fmt::Debug for ChordNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ChordNode")
            .field("descriptor", &self.descriptor)
            .field("successor", &state.fingers.successor().id)
            .field("predecessor", &state.predecessor.as_ref().map(|p| p.id))
            .field("keys", &self.keys.len())
            .finish()
    }
}
