//! Error types for replication.

/// Errors returned by replicated stores and strategies.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Routing or addressing failed in the ring itself.
    #[error(transparent)]
    Ring(#[from] corelib::Error),

    /// A strategy was configured with an unusable replication factor.
    #[error("invalid replication factor {0}: must be at least 1")]
    InvalidFactor(usize),
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
