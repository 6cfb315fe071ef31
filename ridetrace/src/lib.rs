//! RideTrace - Per-ride GPS location streaming for chauffeur fleet backends
//!
//! This library provides the location tracking subsystem of a driver client:
//! a supervisor that runs one cancellable sampling loop per active ride,
//! acquiring GPS fixes, adapting the update cadence to destination
//! proximity, and delivering updates to a fleet backend with bounded retry.
//!
//! The entry point is [`tracking::TrackingSupervisor`]; callers provide the
//! platform capabilities behind the [`location::Geolocator`],
//! [`location::PermissionGate`] and [`transport::UpdateTransport`] traits.

pub mod config;
pub mod geo;
pub mod location;
pub mod log;
pub mod tracking;
pub mod transport;

/// Library version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
