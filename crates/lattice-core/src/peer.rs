//! Peer records — the registry's view of one registered overlay node.

use std::cmp::Ordering;
use std::fmt;

/// Identity and reachability info for one registered peer.
///
/// The ID is assigned by the registry at registration time and is unique
/// among currently-registered peers. Ordering is by ID only — the sorted
/// order is the basis for finger computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: i32,
    pub ip: String,
    pub port: u16,
}

impl PeerRecord {
    pub fn new(id: i32, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            ip: ip.into(),
            port,
        }
    }

    /// `ip:port` string suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Ord for PeerRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for PeerRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} @ {}:{}", self.id, self.ip, self.port)
    }
}
