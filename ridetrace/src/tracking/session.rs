//! Per-ride tracking session state.
//!
//! One `SessionState` exists per actively tracked ride. The sampling loop
//! mutates it (interval, failure count, status) and the supervisor reads it
//! for snapshots, so the mutable parts sit behind a mutex.
//!
//! # State Machine
//!
//! ```text
//! Inactive --[start_tracking]--> Active
//! Active --[failure_threshold consecutive failed cycles]--> Error
//! Error --[one successful send]--> Active
//! Active|Error --[stop_tracking]--> Inactive
//! ```
//!
//! `PermissionRequired` is only ever emitted as a transient status event on
//! a denied start; no stored session carries it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;
use crate::geo::Coordinates;

/// Tracking status of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingStatus {
    /// No tracking loop is running for this ride.
    Inactive,
    /// Updates are flowing (or recovering within the failure threshold).
    Active,
    /// Too many consecutive failed cycles; the loop keeps trying.
    Error,
    /// Location permission was missing when tracking was requested.
    PermissionRequired,
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingStatus::Inactive => write!(f, "inactive"),
            TrackingStatus::Active => write!(f, "active"),
            TrackingStatus::Error => write!(f, "error"),
            TrackingStatus::PermissionRequired => write!(f, "permission required"),
        }
    }
}

/// Internal mutable state for one session.
#[derive(Debug)]
struct SessionInner {
    status: TrackingStatus,
    destination: Option<Coordinates>,
    current_interval: Duration,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
}

/// State for one actively tracked ride.
///
/// Shared between the supervisor (snapshots, destination updates) and the
/// ride's sampling loop (everything else) behind an `Arc`.
#[derive(Debug)]
pub struct SessionState {
    ride_id: String,
    inner: Mutex<SessionInner>,
}

impl SessionState {
    /// Create state for a freshly started session.
    ///
    /// Registration is activation, so a new session is already `Active`.
    pub fn new(ride_id: &str, config: &TrackingConfig, destination: Option<Coordinates>) -> Self {
        Self {
            ride_id: ride_id.to_string(),
            inner: Mutex::new(SessionInner {
                status: TrackingStatus::Active,
                destination,
                current_interval: config.default_interval,
                consecutive_failures: 0,
                last_success: None,
            }),
        }
    }

    /// Ride this session belongs to.
    pub fn ride_id(&self) -> &str {
        &self.ride_id
    }

    /// Current status.
    pub fn status(&self) -> TrackingStatus {
        self.inner.lock().status
    }

    /// Current destination, if one is set.
    pub fn destination(&self) -> Option<Coordinates> {
        self.inner.lock().destination
    }

    /// Replace the destination. Takes effect on the next cycle.
    pub fn set_destination(&self, destination: Option<Coordinates>) {
        self.inner.lock().destination = destination;
    }

    /// Interval the loop last settled on.
    pub fn current_interval(&self) -> Duration {
        self.inner.lock().current_interval
    }

    /// Record the interval chosen for the current cycle.
    pub fn set_current_interval(&self, interval: Duration) {
        self.inner.lock().current_interval = interval;
    }

    /// Consecutive failed cycles since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Record a successful send.
    ///
    /// Resets the failure counter and stamps `last_success`. Returns the
    /// status transition if the session recovered from `Error`.
    pub fn record_success(&self) -> Option<(TrackingStatus, TrackingStatus)> {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.last_success = Some(Utc::now());

        if inner.status == TrackingStatus::Error {
            inner.status = TrackingStatus::Active;
            Some((TrackingStatus::Error, TrackingStatus::Active))
        } else {
            None
        }
    }

    /// Record a cycle that exhausted its attempts without a delivery.
    ///
    /// Returns the new consecutive-failure count and, when the count crosses
    /// `failure_threshold` while the session is `Active`, the degradation
    /// transition.
    pub fn record_failed_cycle(
        &self,
        failure_threshold: u32,
    ) -> (u32, Option<(TrackingStatus, TrackingStatus)>) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let transition = if inner.status == TrackingStatus::Active
            && inner.consecutive_failures >= failure_threshold
        {
            inner.status = TrackingStatus::Error;
            Some((TrackingStatus::Active, TrackingStatus::Error))
        } else {
            None
        };

        (inner.consecutive_failures, transition)
    }

    /// Mark the session stopped. Returns the transition to emit.
    pub fn mark_stopped(&self) -> (TrackingStatus, TrackingStatus) {
        let mut inner = self.inner.lock();
        let old = inner.status;
        inner.status = TrackingStatus::Inactive;
        (old, TrackingStatus::Inactive)
    }

    /// Point-in-time snapshot for display.
    pub fn summary(&self) -> SessionSummary {
        let inner = self.inner.lock();
        SessionSummary {
            ride_id: self.ride_id.clone(),
            status: inner.status,
            current_interval: inner.current_interval,
            consecutive_failures: inner.consecutive_failures,
            last_success: inner.last_success,
        }
    }
}

/// Snapshot of one session for UI display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Ride this session belongs to.
    pub ride_id: String,
    /// Status at snapshot time.
    pub status: TrackingStatus,
    /// Interval the loop last settled on.
    pub current_interval: Duration,
    /// Consecutive failed cycles since the last success.
    pub consecutive_failures: u32,
    /// When the backend last accepted an update.
    pub last_success: Option<DateTime<Utc>>,
}
