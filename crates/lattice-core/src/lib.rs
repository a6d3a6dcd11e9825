//! lattice-core — wire format, topology construction, and routing rules
//! shared by the registry and node daemons.

pub mod config;
pub mod conn;
pub mod fingers;
pub mod frame;
pub mod manifest;
pub mod peer;
pub mod routing;
pub mod wire;

pub use conn::Connection;
pub use manifest::RoutingManifest;
pub use peer::PeerRecord;
pub use wire::{DataPacket, Message, ProtocolError, TrafficSummary};
