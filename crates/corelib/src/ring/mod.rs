//! The Chord ring: interval arithmetic, finger tables and the coordinator
//! that owns membership and drives maintenance.

pub mod finger;
pub mod position;
pub mod ring;

pub use finger::FingerTable;
pub use position::{between, between_closed_open, between_open};
pub use ring::{Ring, RingBuilder, RoundReport};
