//! Per-ride location tracking.
//!
//! This module implements the tracking side of the crate: a supervisor that
//! owns one cancellable sampling loop per active ride, adapts the update
//! cadence to destination proximity, retries failed sends on a fixed-delay
//! budget, and degrades a session to an error state after too many failed
//! cycles in a row.
//!
//! # Key Features
//!
//! - **One loop per ride**: each started ride runs its own tokio task with
//!   its own cancellation token; rides never block each other
//! - **Proximity cadence**: near the destination the loop switches from the
//!   default interval to the faster proximity interval
//! - **Bounded retry**: every send gets a fixed attempt budget inside the
//!   cycle; an exhausted budget costs one failed cycle, never the session
//! - **Graceful degradation**: consecutive failed cycles past the threshold
//!   move the session to `Error`; the loop keeps running and one delivered
//!   update recovers it
//! - **Race-free stop**: stopping cancels, awaits the loop, and releases the
//!   token only afterwards, so no event for the ride trails the stop call
//!
//! # Session States
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `Inactive` | No session registered for the ride |
//! | `Active` | Loop running, updates flowing |
//! | `Error` | Loop running, too many consecutive failed cycles |
//! | `PermissionRequired` | Start refused, location permission missing |
//!
//! # Module Structure
//!
//! ```text
//! tracking/
//! ├── mod.rs           # This file - module exports
//! ├── events.rs        # TrackingEvent broadcast payloads
//! ├── policy.rs        # SendRetryPolicy
//! ├── session.rs       # SessionState, TrackingStatus, SessionSummary
//! ├── supervisor.rs    # TrackingSupervisor (public entry point)
//! └── worker.rs        # TrackingWorker sampling loop (crate-private)
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ridetrace::config::TrackingConfig;
//! use ridetrace::geo::Coordinates;
//! use ridetrace::tracking::{TrackingEvent, TrackingSupervisor};
//!
//! let supervisor = Arc::new(TrackingSupervisor::new(
//!     TrackingConfig::default(),
//!     geolocator,
//!     permission_gate,
//!     transport,
//! ));
//!
//! let mut events = supervisor.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let TrackingEvent::StatusChanged { ride_id, new, .. } = event {
//!             println!("{ride_id} is now {new}");
//!         }
//!     }
//! });
//!
//! supervisor
//!     .start_tracking("ride-42", Some(Coordinates::new(52.5200, 13.4050)))
//!     .await;
//! ```

mod events;
mod policy;
mod session;
mod supervisor;
mod worker;

// Re-export public types
pub use events::TrackingEvent;
pub use policy::SendRetryPolicy;
pub use session::{SessionState, SessionSummary, TrackingStatus};
pub use supervisor::TrackingSupervisor;
