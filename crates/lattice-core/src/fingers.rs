//! Finger table construction.
//!
//! Pure functions from a *sorted* peer list to per-peer finger lists.
//! For the peer at sorted position `p` among `n` peers, finger `i`
//! (0 <= i < NR) targets sorted position `(2^i + p) mod n`; a position
//! that lands on `p` itself advances to `(p + 1) mod n` — a finger may
//! never point at self. Duplicate fingers are kept: on small rings the
//! power-of-two offsets collide, and the table guarantees every offset
//! is present rather than a minimal degree.

use crate::peer::PeerRecord;

/// Fewest peers for which an overlay can be built.
pub const MIN_PEERS: usize = 2;

/// Default finger count when the operator does not supply one.
pub const DEFAULT_NR: u32 = 3;

/// Sorted positions of the `nr` fingers for the peer at position `p`.
///
/// Requires `n >= MIN_PEERS`; callers refuse overlay setup below that.
pub fn finger_positions(p: usize, n: usize, nr: u32) -> Vec<usize> {
    debug_assert!(n >= MIN_PEERS);
    (0..nr)
        .map(|i| {
            let hop = (pow2_mod(i, n) + p) % n;
            if hop == p {
                (p + 1) % n
            } else {
                hop
            }
        })
        .collect()
}

/// `2^exp mod n` without materializing `2^exp`, which leaves usize
/// for any exponent past 63.
fn pow2_mod(exp: u32, n: usize) -> usize {
    let mut acc = 1 % n;
    for _ in 0..exp {
        acc = (acc * 2) % n;
    }
    acc
}

/// Finger list for the peer at sorted position `pos`.
pub fn fingers_for(sorted: &[PeerRecord], pos: usize, nr: u32) -> Vec<PeerRecord> {
    finger_positions(pos, sorted.len(), nr)
        .into_iter()
        .map(|hop| sorted[hop].clone())
        .collect()
}

/// Finger lists for every peer, in sorted order, keyed by peer ID.
pub fn build_all(sorted: &[PeerRecord], nr: u32) -> Vec<(i32, Vec<PeerRecord>)> {
    (0..sorted.len())
        .map(|pos| (sorted[pos].id, fingers_for(sorted, pos, nr)))
        .collect()
}
