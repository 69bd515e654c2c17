//! Core library for a Chord distributed hash table.
//!
//! This crate provides:
//! - Ring identifiers and consistent hashing ([`id`])
//! - Circular intervals and finger tables ([`ring`])
//! - The node record and its key store ([`node`], [`store`])
//! - The client boundary between nodes ([`network`])
//! - Routing ([`routing`]) and the membership protocol ([`protocol`])
//! - The ring coordinator and background maintenance ([`Ring`],
//!   [`maintenance`])

pub mod config;
pub mod error;
pub mod id;
pub mod maintenance;
pub mod network;
pub mod node;
pub mod protocol;
pub mod ring;
pub mod routing;
pub mod store;

pub use config::RingConfig;
pub use error::{Error, Result};
pub use id::{IdSpace, RingId};
pub use maintenance::{spawn_maintenance, MaintenanceHandle};
pub use network::{LocalNetwork, RingClient};
pub use node::{ChordNode, NodeDescriptor, NodeSnapshot};
pub use ring::{Ring, RingBuilder, RoundReport};
pub use routing::Route;
pub use store::KeyStore;
