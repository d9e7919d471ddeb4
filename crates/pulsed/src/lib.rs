//! pulse telemetry hub — real-time relay between machine reporters and
//! dashboard clients.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Seam to the account backend (authentication, persistence, machine creation).
pub mod backend;
/// CLI argument parsing and hub configuration.
pub mod config;
/// Pairing-key issue, redemption, and machine enrollment.
pub mod enroll;
/// Error types for hub connection handling.
pub mod error;
mod heartbeat;
/// Short-lived pairing keys for machine enrollment.
pub mod keys;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Identity-keyed sink registries for connected peers.
pub mod registry;
mod relay;
/// Accept loop and shared hub state.
pub mod server;
mod session;

#[cfg(test)]
mod test_support;

pub use server::{run, run_with_shutdown, HubState};
