//! Events broadcast by the tracking supervisor.
//!
//! Consumers subscribe via `TrackingSupervisor::subscribe` and own their
//! receiver: dropping it is unsubscribing. Events are telemetry, not control
//! flow; a slow subscriber that lags the broadcast channel misses old events
//! rather than slowing any loop down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::TrackingStatus;

/// One observable occurrence in the tracking subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TrackingEvent {
    /// A session's status changed.
    #[serde(rename = "tracking-status-changed")]
    StatusChanged {
        /// Ride whose status changed.
        ride_id: String,
        /// Status before the change.
        old: TrackingStatus,
        /// Status after the change.
        new: TrackingStatus,
        /// Human-readable context, when there is something to say.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The backend accepted an update.
    #[serde(rename = "update-sent")]
    UpdateSent {
        /// Ride the update belongs to.
        ride_id: String,
        /// Latitude that was sent.
        latitude: f64,
        /// Longitude that was sent.
        longitude: f64,
        /// When the underlying fix was taken.
        recorded_at: DateTime<Utc>,
        /// Sampling interval chosen for this cycle, in seconds.
        interval_secs: u64,
    },

    /// One delivery attempt failed.
    #[serde(rename = "update-failed")]
    UpdateFailed {
        /// Ride the attempt belonged to.
        ride_id: String,
        /// What went wrong, in words fit for a log line.
        message: String,
        /// Whether the cycle has budget left for another attempt.
        will_retry: bool,
        /// Attempt number that failed (1-based within the cycle).
        retry_count: u32,
    },
}

impl TrackingEvent {
    /// Ride this event is about.
    pub fn ride_id(&self) -> &str {
        match self {
            TrackingEvent::StatusChanged { ride_id, .. } => ride_id,
            TrackingEvent::UpdateSent { ride_id, .. } => ride_id,
            TrackingEvent::UpdateFailed { ride_id, .. } => ride_id,
        }
    }
}
