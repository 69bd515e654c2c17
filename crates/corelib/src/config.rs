//! Ring configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::IdSpace;

/// Tunables shared by every node of a ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Identifier width `M`. The ring holds `2^M` identifiers.
    pub id_bits: u8,
    /// Ring-wide `stabilize` + `fix_fingers` rounds run after every join and
    /// leave.
    pub stabilization_rounds: usize,
    /// Upper bound on hops for a single routing walk or finger propagation.
    /// `0` means "twice the ring size, capped at 4096".
    pub max_hops: usize,
    /// Period of the background maintenance task, in milliseconds.
    pub maintenance_interval_ms: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            id_bits: 8,
            stabilization_rounds: 3,
            max_hops: 0,
            maintenance_interval_ms: 1_000,
        }
    }
}

impl RingConfig {
    /// Checks the config and returns the identifier space it describes.
    pub fn validate(&self) -> Result<IdSpace> {
        let space = IdSpace::new(self.id_bits)?;
        if self.maintenance_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "maintenance_interval_ms must be positive".to_string(),
            ));
        }
        Ok(space)
    }

    /// Hop budget with the `0` default resolved.
    pub fn hop_limit(&self) -> usize {
        if self.max_hops > 0 {
            return self.max_hops;
        }
        let size = 1usize.checked_shl(u32::from(self.id_bits)).unwrap_or(usize::MAX);
        size.saturating_mul(2).min(4096)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}
