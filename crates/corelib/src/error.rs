//! Error types for the core library.

use crate::id::RingId;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing or maintaining the ring.
///
/// A missing key is not an error: lookups return `Option`. Stale pointers
/// observed during stabilization are repaired silently and never show up here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Routing could not reach the owner of `target` within the hop budget.
    /// Indicates a broken successor chain.
    #[error("routing failure: no owner for {target} after {hops} hops")]
    RoutingFailure { target: RingId, hops: usize },

    /// The operation is not valid in the node's or ring's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The addressed node is not registered with the network.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// Ring configuration rejected at build time.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
