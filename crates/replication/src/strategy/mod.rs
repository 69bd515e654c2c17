//! Replication strategy abstractions.
//!
//! A strategy picks the nodes that hold copies of a key besides its owner:
//!
//! - **NeighborStrategy**: the owner's successor and predecessor
//! - **SimpleStrategy**: the next N-1 nodes clockwise from the owner

pub mod neighbors;
pub mod simple;

pub use neighbors::NeighborStrategy;
pub use simple::SimpleStrategy;

use corelib::{ChordNode, NodeDescriptor};

/// Trait for replication strategies.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as one store is shared
/// by every caller thread.
pub trait ReplicationStrategy: Send + Sync + 'static {
    /// Total copies kept, owner included.
    fn replication_factor(&self) -> usize;

    /// Replica holders for a key owned by `owner`, excluding the owner.
    ///
    /// `via` is the node the request entered the ring through; its client is
    /// used to query ring neighbours.
    fn replicas(&self, via: &ChordNode, owner: &NodeDescriptor) -> corelib::Result<Vec<NodeDescriptor>>;

    /// Strategy name (for logging/debugging).
    fn name(&self) -> &'static str;
}
