//! End-to-end tests: registry and peers running in-process over loopback.

mod harness;
mod overlay;
mod registration;
mod rounds;

pub use harness::*;
