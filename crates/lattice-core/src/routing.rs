//! Next-hop selection over a node's finger-connection keys.
//!
//! Used identically whether originating or relaying a packet. The
//! wrap-around rule (step 3) reaches for the finger farthest from the
//! destination on the ID line as a long jump back around the ring;
//! this is not textbook Chord closest-preceding-finger, and changing
//! it would change hop traces across the whole overlay.

/// Pick the finger to forward toward `destination`.
///
/// 1. a key equal to the destination wins (direct delivery);
/// 2. otherwise the largest key strictly below the destination
///    (closest predecessor on the ID line);
/// 3. otherwise — the destination is behind this node — the key
///    maximizing `|destination - key|`;
/// 4. `None` if there are no keys at all: the packet is dropped.
pub fn next_hop(destination: i32, keys: impl IntoIterator<Item = i32>) -> Option<i32> {
    let mut best_below: Option<i32> = None;
    let mut farthest: Option<(i64, i32)> = None;

    for key in keys {
        if key == destination {
            return Some(key);
        }
        if key < destination && best_below.map_or(true, |b| key > b) {
            best_below = Some(key);
        }
        let distance = (destination as i64 - key as i64).abs();
        if farthest.map_or(true, |(d, _)| distance > d) {
            farthest = Some((distance, key));
        }
    }

    best_below.or(farthest.map(|(_, key)| key))
}
