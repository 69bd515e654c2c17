//! Replication for the Chord key store.
//!
//! This crate provides pluggable replication strategies that determine which
//! nodes hold copies of a key besides its owner, and [`ReplicatedStore`],
//! which writes a key to its owner and then, best-effort, to every replica.

pub mod error;
pub mod store;
pub mod strategy;

pub use error::ReplicationError;
pub use store::{ReplicatedStore, StoreReceipt};
pub use strategy::{NeighborStrategy, ReplicationStrategy, SimpleStrategy};
