//! Registry side of the lattice overlay: tracks peer registrations,
//! builds and pushes finger-table manifests, and drives task rounds.

pub mod console;
pub mod coordinator;
pub mod listener;
pub mod stats;

pub use coordinator::Coordinator;
pub use listener::RegistryServer;
pub use stats::{ConsoleStatistics, SummarySink};
