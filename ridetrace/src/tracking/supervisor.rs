//! The tracking supervisor.
//!
//! Owns every active tracking session and the one shared resource between
//! them: the session map. Each started ride gets its own sampling loop on
//! its own tokio task; the supervisor only ever touches a loop through its
//! `SessionHandle`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     TrackingSupervisor                       │
//! │                                                              │
//! │  start_tracking ──► permission check ──► register session   │
//! │                                               │              │
//! │                                               ▼              │
//! │          sessions: DashMap<ride_id, SessionHandle>           │
//! │                 │                    │                       │
//! │                 ▼                    ▼                       │
//! │         ┌──────────────┐     ┌──────────────┐                │
//! │         │ TrackingWorker│ ... │ TrackingWorker│  (1 per ride) │
//! │         └──────┬───────┘     └──────┬───────┘                │
//! │                └────────┬───────────┘                        │
//! │                         ▼                                    │
//! │              broadcast::Sender<TrackingEvent>                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Stop Ordering
//!
//! `stop_tracking` takes the handle out of the map, cancels, **awaits** the
//! loop (bounded by `stop_grace`), and only then lets the token and join
//! handle drop together. The loop can never observe a disposed token, and
//! no event for that ride is emitted after `stop_tracking` returns.
//!
//! # Example
//!
//! ```ignore
//! use ridetrace::config::TrackingConfig;
//! use ridetrace::geo::Coordinates;
//! use ridetrace::tracking::TrackingSupervisor;
//!
//! let supervisor = TrackingSupervisor::new(
//!     TrackingConfig::default(),
//!     geolocator,
//!     permission_gate,
//!     transport,
//! );
//! let mut events = supervisor.subscribe();
//!
//! supervisor
//!     .start_tracking("ride-42", Some(Coordinates::new(52.5200, 13.4050)))
//!     .await;
//!
//! // ... ride runs ...
//!
//! supervisor.stop_tracking("ride-42").await;
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::geo::Coordinates;
use crate::location::{Geolocator, PermissionGate};
use crate::transport::UpdateTransport;

use super::events::TrackingEvent;
use super::session::{SessionState, SessionSummary, TrackingStatus};
use super::worker::TrackingWorker;

// =============================================================================
// Configuration
// =============================================================================

/// Capacity of the tracking event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Session Handle
// =============================================================================

/// One ride's loop task and cancellation token, owned as a single unit.
///
/// The pair leaves the session map together (only via stop) and drops
/// together, after the task has been awaited.
struct SessionHandle {
    session: Arc<SessionState>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

// =============================================================================
// Supervisor
// =============================================================================

/// Supervises all per-ride tracking loops.
pub struct TrackingSupervisor {
    config: TrackingConfig,
    geolocator: Arc<dyn Geolocator>,
    permission_gate: Arc<dyn PermissionGate>,
    transport: Arc<dyn UpdateTransport>,
    sessions: DashMap<String, SessionHandle>,
    events_tx: broadcast::Sender<TrackingEvent>,
}

impl std::fmt::Debug for TrackingSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSupervisor")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl TrackingSupervisor {
    /// Create a supervisor with its collaborators.
    ///
    /// The supervisor re-reads nothing ambient: configuration and
    /// capabilities are captured here, once.
    pub fn new(
        config: TrackingConfig,
        geolocator: Arc<dyn Geolocator>,
        permission_gate: Arc<dyn PermissionGate>,
        transport: Arc<dyn UpdateTransport>,
    ) -> Self {
        let (events_tx, _events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            geolocator,
            permission_gate,
            transport,
            sessions: DashMap::new(),
            events_tx,
        }
    }

    /// The configuration this supervisor runs with.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Subscribe to the tracking event stream.
    ///
    /// Dropping the receiver unsubscribes. A receiver that falls behind the
    /// channel capacity misses old events rather than blocking any loop.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events_tx.subscribe()
    }

    /// Start tracking a ride.
    ///
    /// Idempotent: if the ride is already tracked, its destination is
    /// updated and no new loop starts. Returns false when location
    /// permission is missing or a concurrent start won the registration.
    pub async fn start_tracking(&self, ride_id: &str, destination: Option<Coordinates>) -> bool {
        if let Some(handle) = self.sessions.get(ride_id) {
            handle.session.set_destination(destination);
            debug!(ride_id = %ride_id, "Tracking already active, destination updated");
            return true;
        }

        let permission = self.permission_gate.ensure_granted().await;
        if !permission.is_granted() {
            warn!(
                ride_id = %ride_id,
                permission = %permission,
                "Tracking not started, location permission missing"
            );
            self.emit(TrackingEvent::StatusChanged {
                ride_id: ride_id.to_string(),
                old: TrackingStatus::Inactive,
                new: TrackingStatus::PermissionRequired,
                message: Some(format!("location permission {}", permission)),
            });
            self.emit(TrackingEvent::UpdateFailed {
                ride_id: ride_id.to_string(),
                message: format!("tracking not started: location permission {}", permission),
                will_retry: false,
                retry_count: 0,
            });
            return false;
        }

        match self.sessions.entry(ride_id.to_string()) {
            Entry::Occupied(_) => {
                // A concurrent start registered while the permission check
                // was in flight; that session owns the ride now
                debug!(ride_id = %ride_id, "Concurrent start won registration");
                false
            }
            Entry::Vacant(entry) => {
                let session = Arc::new(SessionState::new(ride_id, &self.config, destination));
                let cancellation = CancellationToken::new();
                let worker = TrackingWorker::new(
                    Arc::clone(&session),
                    self.config.clone(),
                    Arc::clone(&self.geolocator),
                    Arc::clone(&self.transport),
                    self.events_tx.clone(),
                );

                info!(ride_id = %ride_id, "Tracking started");
                self.emit(TrackingEvent::StatusChanged {
                    ride_id: ride_id.to_string(),
                    old: TrackingStatus::Inactive,
                    new: TrackingStatus::Active,
                    message: None,
                });

                let task = tokio::spawn(worker.run(cancellation.clone()));
                entry.insert(SessionHandle {
                    session,
                    cancellation,
                    task,
                });
                true
            }
        }
    }

    /// Stop tracking a ride.
    ///
    /// Completes once the loop has exited, or after `stop_grace` if it has
    /// not. Stopping an unknown ride is a no-op.
    pub async fn stop_tracking(&self, ride_id: &str) {
        let Some((_, handle)) = self.sessions.remove(ride_id) else {
            debug!(ride_id = %ride_id, "Stop requested for a ride that is not tracked");
            return;
        };

        info!(ride_id = %ride_id, "Stopping tracking");
        handle.cancellation.cancel();

        match tokio::time::timeout(self.config.stop_grace, handle.task).await {
            Ok(Ok(())) => debug!(ride_id = %ride_id, "Tracking loop exited"),
            Ok(Err(join_err)) => {
                warn!(ride_id = %ride_id, error = %join_err, "Tracking loop ended abnormally")
            }
            Err(_) => warn!(
                ride_id = %ride_id,
                grace_secs = self.config.stop_grace.as_secs(),
                "Tracking loop did not exit within the stop grace period"
            ),
        }

        // The loop has been awaited; token and handle go out of scope
        // together below
        let (old, new) = handle.session.mark_stopped();
        self.emit(TrackingEvent::StatusChanged {
            ride_id: ride_id.to_string(),
            old,
            new,
            message: None,
        });
        info!(ride_id = %ride_id, "Tracking stopped");
    }

    /// Stop every tracked ride, concurrently.
    pub async fn stop_all_tracking(&self) {
        let ride_ids: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        if ride_ids.is_empty() {
            return;
        }

        info!(sessions = ride_ids.len(), "Stopping all tracking");
        join_all(
            ride_ids
                .iter()
                .map(|ride_id| self.stop_tracking(ride_id)),
        )
        .await;
    }

    /// Whether a ride currently has a session.
    pub fn is_tracking(&self, ride_id: &str) -> bool {
        self.sessions.contains_key(ride_id)
    }

    /// Status of a ride. Absent rides are `Inactive`.
    pub fn status(&self, ride_id: &str) -> TrackingStatus {
        self.sessions
            .get(ride_id)
            .map(|handle| handle.session.status())
            .unwrap_or(TrackingStatus::Inactive)
    }

    /// Replace a ride's destination (pickup to dropoff handoff).
    ///
    /// Takes effect on the ride's next cycle. No-op for unknown rides.
    pub fn update_destination(&self, ride_id: &str, latitude: f64, longitude: f64) {
        match self.sessions.get(ride_id) {
            Some(handle) => {
                handle
                    .session
                    .set_destination(Some(Coordinates::new(latitude, longitude)));
                debug!(ride_id = %ride_id, latitude, longitude, "Destination updated");
            }
            None => debug!(ride_id = %ride_id, "Destination update for a ride that is not tracked"),
        }
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Point-in-time snapshot of every session, ordered by ride id.
    pub fn session_overview(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| entry.value().session.summary())
            .collect();
        summaries.sort_by(|a, b| a.ride_id.cmp(&b.ride_id));
        summaries
    }

    fn emit(&self, event: TrackingEvent) {
        // Nobody listening is fine; events are telemetry
        let _ = self.events_tx.send(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
