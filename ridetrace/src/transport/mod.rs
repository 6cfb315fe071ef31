//! Backend delivery of location updates.
//!
//! The tracking loop hands each acquired sample to an `UpdateTransport` and
//! reacts to the classified outcome. Rejections the backend is expected to
//! produce (ride not in a trackable state, expired token, throttling) are
//! outcomes rather than errors: the retry budget and the session state
//! machine decide what happens next, not error propagation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::{BoxFuture, LocationSample};

/// One location update addressed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Ride this update belongs to.
    pub ride_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Heading in degrees, if the device reported one.
    pub heading_deg: Option<f64>,
    /// Ground speed in meters per second, if the device reported one.
    pub speed_mps: Option<f64>,
    /// Horizontal accuracy radius in meters, if the device reported one.
    pub accuracy_m: Option<f64>,
    /// When the underlying fix was taken.
    pub recorded_at: DateTime<Utc>,
}

impl LocationUpdate {
    /// Build an update for a ride from an acquired sample.
    pub fn from_sample(ride_id: &str, sample: &LocationSample) -> Self {
        Self {
            ride_id: ride_id.to_string(),
            latitude: sample.latitude,
            longitude: sample.longitude,
            heading_deg: sample.heading_deg,
            speed_mps: sample.speed_mps,
            accuracy_m: sample.accuracy_m,
            recorded_at: sample.recorded_at,
        }
    }
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendOutcome {
    /// The backend accepted the update.
    Delivered,

    /// The backend rejected the update because the ride is not in a
    /// trackable state. Recurs briefly when tracking starts before the
    /// server-side status transition has landed.
    InvalidRideState,

    /// The backend rejected the caller's credentials. Re-authentication is
    /// an app-level action, so retrying within a cycle is pointless.
    Unauthorized,

    /// The backend asked the client to slow down.
    RateLimited,

    /// The request never produced a backend verdict (connectivity loss,
    /// timeout, transport-level failure).
    NetworkFailure(String),
}

impl SendOutcome {
    /// Returns true if the backend accepted the update.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Returns true if another attempt within the same cycle can help.
    ///
    /// Unauthorized is excluded: a fresh token cannot appear within a retry
    /// delay, so the cycle fails immediately and the caller is told why.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidRideState | Self::RateLimited | Self::NetworkFailure(_)
        )
    }

    /// Short outcome label for logs and failure events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::InvalidRideState => "invalid-ride-state",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate-limited",
            Self::NetworkFailure(_) => "network-failure",
        }
    }
}

/// Delivery of location updates to the ride backend.
///
/// Implementations own the HTTP client, auth header plumbing, and endpoint
/// layout. They classify every completed request into a `SendOutcome`;
/// only outcomes the loop can act on cross this boundary.
pub trait UpdateTransport: Send + Sync {
    /// Deliver one update. Never panics on backend rejection.
    fn send<'a>(&'a self, update: &'a LocationUpdate) -> BoxFuture<'a, SendOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_retryable_classification() {
        assert!(SendOutcome::InvalidRideState.is_retryable());
        assert!(SendOutcome::RateLimited.is_retryable());
        assert!(SendOutcome::NetworkFailure("connection reset".to_string()).is_retryable());

        assert!(!SendOutcome::Delivered.is_retryable());
        assert!(!SendOutcome::Unauthorized.is_retryable());
    }

    #[test]
    fn test_outcome_kind_labels() {
        assert_eq!(SendOutcome::Delivered.kind(), "delivered");
        assert_eq!(SendOutcome::InvalidRideState.kind(), "invalid-ride-state");
        assert_eq!(SendOutcome::Unauthorized.kind(), "unauthorized");
        assert_eq!(SendOutcome::RateLimited.kind(), "rate-limited");
        assert_eq!(
            SendOutcome::NetworkFailure("dns".to_string()).kind(),
            "network-failure"
        );
    }

    #[test]
    fn test_update_from_sample_copies_fields() {
        let mut sample = LocationSample::new(40.7128, -74.0060);
        sample.heading_deg = Some(85.0);
        sample.speed_mps = Some(11.2);
        sample.accuracy_m = Some(6.5);

        let update = LocationUpdate::from_sample("ride-42", &sample);

        assert_eq!(update.ride_id, "ride-42");
        assert_eq!(update.latitude, sample.latitude);
        assert_eq!(update.longitude, sample.longitude);
        assert_eq!(update.heading_deg, Some(85.0));
        assert_eq!(update.speed_mps, Some(11.2));
        assert_eq!(update.accuracy_m, Some(6.5));
        assert_eq!(update.recorded_at, sample.recorded_at);
    }
}
