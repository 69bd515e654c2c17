//! Ring identifiers and the identifier space they live in.
//!
//! Identifiers are integers in `[0, 2^M)`. Keys and node addresses are mapped
//! onto the ring by hashing: BLAKE3 digest, first four bytes read big-endian,
//! reduced modulo the ring size. The mapping is unseeded so it is stable
//! across runs.
//!
//! Distinct keys may collide on small rings. A colliding write replaces the
//! previous value for that identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest supported identifier width. Hashing only keeps four digest bytes.
pub const MAX_ID_BITS: u8 = 32;

/// Position on the identifier ring.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RingId(pub u64);

impl fmt::Display for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RingId {
    fn from(value: u64) -> Self {
        RingId(value)
    }
}

/// The identifier space `[0, 2^bits)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct IdSpace {
    bits: u8,
}

impl IdSpace {
    /// Creates a space of `bits` bits. Accepts `1..=32`.
    pub fn new(bits: u8) -> Result<Self> {
        if bits == 0 || bits > MAX_ID_BITS {
            return Err(Error::InvalidConfig(format!(
                "id_bits must be in 1..={MAX_ID_BITS}, got {bits}"
            )));
        }
        Ok(Self { bits })
    }

    /// Number of bits (`M`). Also the finger table length.
    #[inline]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Ring size `2^M`.
    #[inline]
    pub fn size(&self) -> u64 {
        1u64 << self.bits
    }

    /// Reduces an arbitrary integer into the space.
    #[inline]
    pub fn wrap(&self, value: u64) -> RingId {
        RingId(value & (self.size() - 1))
    }

    /// `(id + 2^i) mod 2^M`, the start of finger `i`.
    #[inline]
    pub fn finger_start(&self, id: RingId, i: usize) -> RingId {
        self.wrap(id.0.wrapping_add(1u64 << i))
    }

    /// `(id + n) mod 2^M`.
    #[inline]
    pub fn add(&self, id: RingId, n: u64) -> RingId {
        self.wrap(id.0.wrapping_add(n))
    }

    /// `(id - n) mod 2^M`.
    #[inline]
    pub fn sub(&self, id: RingId, n: u64) -> RingId {
        let n = n & (self.size() - 1);
        self.wrap(id.0 + self.size() - n)
    }

    /// Hashes an opaque key onto the ring.
    pub fn hash(&self, key: &str) -> RingId {
        self.hash_bytes(key.as_bytes())
    }

    /// Hashes raw bytes onto the ring.
    pub fn hash_bytes(&self, data: &[u8]) -> RingId {
        let digest = blake3::hash(data);
        let b = digest.as_bytes();
        let prefix = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        RingId(u64::from(prefix) % self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_bits() {
        assert!(IdSpace::new(0).is_err());
        assert!(IdSpace::new(33).is_err());
        assert!(IdSpace::new(32).is_ok());
    }

    #[test]
    fn test_hash_is_deterministic_and_in_range() {
        let space = IdSpace::new(8).unwrap();
        for i in 0..500 {
            let key = format!("key-{i}");
            let a = space.hash(&key);
            assert_eq!(a, space.hash(&key));
            assert!(a.0 < 256);
        }
    }

    #[test]
    fn test_hash_spreads_over_ring() {
        let space = IdSpace::new(8).unwrap();
        let distinct: std::collections::HashSet<_> =
            (0..2000).map(|i| space.hash(&format!("127.0.0.1:{i}"))).collect();
        // 2000 keys into 256 buckets should touch nearly every bucket.
        assert!(distinct.len() > 200, "only {} buckets used", distinct.len());
    }

    #[test]
    fn test_finger_start_wraps() {
        let space = IdSpace::new(3).unwrap();
        assert_eq!(space.finger_start(RingId(6), 0), RingId(7));
        assert_eq!(space.finger_start(RingId(6), 1), RingId(0));
        assert_eq!(space.finger_start(RingId(6), 2), RingId(2));
    }

    #[test]
    fn test_sub_wraps() {
        let space = IdSpace::new(3).unwrap();
        assert_eq!(space.sub(RingId(1), 2), RingId(7));
        assert_eq!(space.sub(RingId(5), 4), RingId(1));
        assert_eq!(space.sub(RingId(0), 8), RingId(0));
    }
}
