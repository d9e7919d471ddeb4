//! Common types shared between the pulse hub and its peers.
//!
//! This crate provides:
//! - JSON wire envelope encoding and decoding ([`wire`])
//! - Telemetry data shapes carried by the wire events ([`telemetry`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod telemetry;
pub mod wire;

/// Opaque identity of a user account, as minted by the account backend.
pub type UserId = String;

/// Opaque identity of a monitored machine, as minted by the account backend.
pub type MachineId = String;
