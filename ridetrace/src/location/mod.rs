//! Device location capabilities consumed by the tracking loop.
//!
//! The supervisor never talks to platform location services directly. It is
//! handed a `Geolocator` and a `PermissionGate` at construction, so the same
//! loop runs against a phone's fused location provider in production and
//! against scripted fakes in tests and the diagnostic CLI.
//!
//! # Design Principles
//!
//! - **One-shot acquisition**: the loop asks for a single fix per cycle;
//!   continuous platform subscriptions are an adapter concern
//! - **Status, not errors, for permission**: denial is an expected outcome
//!   with its own state transition, not a failure to propagate
//! - **Dyn-compatible**: Uses `Pin<Box<dyn Future>>` so collaborators can be
//!   held as `Arc<dyn Geolocator>` behind one supervisor type

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single GPS fix as reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Heading in degrees (0 = North), if the device reports one.
    pub heading_deg: Option<f64>,
    /// Ground speed in meters per second, if the device reports one.
    pub speed_mps: Option<f64>,
    /// Horizontal accuracy radius in meters, if the device reports one.
    pub accuracy_m: Option<f64>,
    /// When the fix was taken.
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    /// Create a sample stamped with the current wall-clock time.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            heading_deg: None,
            speed_mps: None,
            accuracy_m: None,
            recorded_at: Utc::now(),
        }
    }

    /// Create a sample with an explicit timestamp (for testing).
    pub fn with_recorded_at(latitude: f64, longitude: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            heading_deg: None,
            speed_mps: None,
            accuracy_m: None,
            recorded_at,
        }
    }
}

/// Outcome of a location permission check.
///
/// Denial is ordinary operating state on a phone, so it is a status rather
/// than an error. Adapter implementations map platform failures they cannot
/// classify to `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    /// Location access is granted; tracking may start.
    Granted,
    /// Access is currently denied; the user can still be prompted.
    Denied,
    /// Access is denied and the platform will not prompt again.
    PermanentlyDenied,
}

impl PermissionStatus {
    /// Whether tracking is allowed to start.
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::PermanentlyDenied => write!(f, "permanently denied"),
        }
    }
}

/// Errors that can occur while acquiring a location fix.
#[derive(Debug, Error)]
pub enum GeolocateError {
    /// No fix arrived within the configured acquisition timeout.
    #[error("no location fix within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The provider reported that no position is available.
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// One-shot location acquisition.
///
/// Implementations return the best single fix they can produce. The tracking
/// loop bounds every call with its configured acquisition timeout, so a slow
/// implementation costs one retry attempt rather than hanging a cycle.
pub trait Geolocator: Send + Sync {
    /// Acquire a single location fix.
    fn acquire(&self) -> BoxFuture<'_, Result<LocationSample, GeolocateError>>;
}

/// Location permission check, evaluated once per tracking start.
pub trait PermissionGate: Send + Sync {
    /// Report whether location access is currently granted.
    fn ensure_granted(&self) -> BoxFuture<'_, PermissionStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_new_stamps_current_time() {
        let before = Utc::now();
        let sample = LocationSample::new(48.0, 11.0);
        let after = Utc::now();

        assert!(sample.recorded_at >= before && sample.recorded_at <= after);
        assert!(sample.heading_deg.is_none());
        assert!(sample.accuracy_m.is_none());
    }

    #[test]
    fn test_permission_status_granted_helper() {
        assert!(PermissionStatus::Granted.is_granted());
        assert!(!PermissionStatus::Denied.is_granted());
        assert!(!PermissionStatus::PermanentlyDenied.is_granted());
    }

    #[test]
    fn test_permission_status_display() {
        assert_eq!(format!("{}", PermissionStatus::Granted), "granted");
        assert_eq!(
            format!("{}", PermissionStatus::PermanentlyDenied),
            "permanently denied"
        );
    }

    #[test]
    fn test_geolocate_error_display() {
        let err = GeolocateError::Timeout { timeout_secs: 10 };
        assert_eq!(format!("{}", err), "no location fix within 10s");

        let err = GeolocateError::Unavailable("airplane mode".to_string());
        assert!(format!("{}", err).contains("airplane mode"));
    }
}
