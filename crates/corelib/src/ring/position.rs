//! Circular interval arithmetic on ring identifiers.
//!
//! Every routing and stabilization decision reduces to "does `b` lie on the
//! clockwise arc from `a` to `c`". None of these depend on the ring size:
//! wraparound is detected from the ordering of `a` and `c` alone.

use crate::id::RingId;

/// True iff `b` lies in the half-open arc `(a, c]`, walking clockwise.
///
/// When `a == c` the arc covers the whole ring, `a` included. A lone node is
/// its own successor and must own every identifier.
#[inline]
pub fn between(a: RingId, b: RingId, c: RingId) -> bool {
    if a < c {
        a < b && b <= c
    } else {
        a < b || b <= c
    }
}

/// True iff `b` lies in the open arc `(a, c)`.
///
/// When `a == c` every identifier except `a` qualifies.
#[inline]
pub fn between_open(a: RingId, b: RingId, c: RingId) -> bool {
    b != c && between(a, b, c)
}

/// True iff `b` lies in `[a, c)`.
#[inline]
pub fn between_closed_open(a: RingId, b: RingId, c: RingId) -> bool {
    b == a || between_open(a, b, c)
}
