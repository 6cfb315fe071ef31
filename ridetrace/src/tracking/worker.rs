//! The per-ride sampling loop.
//!
//! One `TrackingWorker` runs per actively tracked ride, on its own tokio
//! task, bound to the session's cancellation token. Every cycle:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ acquire GPS fix (bounded) ──► distance to destination      │
//! │        │                              │                    │
//! │        ▼                              ▼                    │
//! │ send to backend ◄── pick interval (proximity vs default)   │
//! │        │                                                   │
//! │        ├── delivered ──► reset failures, emit update-sent  │
//! │        ├── retryable ──► delay, retry within budget        │
//! │        └── exhausted ──► count one failed cycle            │
//! │        ▼                                                   │
//! │ sleep current interval, then next cycle                    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every suspension point observes the cancellation token, and cancellation
//! exits without emitting further events. That silence is what lets
//! `stop_tracking` promise "no events after stop returns".

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::geo::{self, Coordinates};
use crate::location::{GeolocateError, Geolocator};
use crate::transport::{LocationUpdate, SendOutcome, UpdateTransport};

use super::events::TrackingEvent;
use super::policy::SendRetryPolicy;
use super::session::SessionState;

/// How one delivery attempt ended.
enum AttemptResult {
    /// The backend accepted this update.
    Delivered(LocationUpdate),
    /// The attempt failed; `fatal` means no further attempt this cycle.
    Failed { message: String, fatal: bool },
}

/// How one full cycle ended.
enum CycleOutcome {
    Delivered,
    Failed,
    Cancelled,
}

/// The sampling loop for one ride.
pub(crate) struct TrackingWorker {
    session: Arc<SessionState>,
    config: TrackingConfig,
    policy: SendRetryPolicy,
    geolocator: Arc<dyn Geolocator>,
    transport: Arc<dyn UpdateTransport>,
    events: broadcast::Sender<TrackingEvent>,
}

impl TrackingWorker {
    pub(crate) fn new(
        session: Arc<SessionState>,
        config: TrackingConfig,
        geolocator: Arc<dyn Geolocator>,
        transport: Arc<dyn UpdateTransport>,
        events: broadcast::Sender<TrackingEvent>,
    ) -> Self {
        let policy = SendRetryPolicy::from_config(&config);
        Self {
            session,
            config,
            policy,
            geolocator,
            transport,
            events,
        }
    }

    /// Run until cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let ride_id = self.session.ride_id().to_string();
        info!(ride_id = %ride_id, "Tracking loop starting");

        // Let the server-side ride-status transition land before the
        // first update has a chance to race it
        if !self.sleep_cancellable(self.config.startup_grace, &cancel).await {
            debug!(ride_id = %ride_id, "Tracking loop cancelled during startup grace");
            return;
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_cycle(&cancel).await {
                CycleOutcome::Cancelled => break,
                CycleOutcome::Delivered | CycleOutcome::Failed => {
                    let interval = self.session.current_interval();
                    if !self.sleep_cancellable(interval, &cancel).await {
                        break;
                    }
                }
            }
        }

        info!(ride_id = %ride_id, "Tracking loop stopped");
    }

    /// One cycle: acquire, adapt, send with the retry budget.
    async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let ride_id = self.session.ride_id().to_string();

        for attempt in 1..=self.policy.max_attempts() {
            let attempt_result = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(ride_id = %ride_id, "Tracking loop cancelled mid-attempt");
                    return CycleOutcome::Cancelled;
                }

                result = self.attempt_once() => result,
            };

            match attempt_result {
                AttemptResult::Delivered(update) => {
                    if let Some((old, new)) = self.session.record_success() {
                        info!(ride_id = %ride_id, "Tracking recovered, updates flowing again");
                        self.emit(TrackingEvent::StatusChanged {
                            ride_id: ride_id.clone(),
                            old,
                            new,
                            message: Some("updates flowing again".to_string()),
                        });
                    }

                    let interval_secs = self.session.current_interval().as_secs();
                    debug!(
                        ride_id = %ride_id,
                        latitude = update.latitude,
                        longitude = update.longitude,
                        interval_secs,
                        attempt,
                        "Location update delivered"
                    );
                    self.emit(TrackingEvent::UpdateSent {
                        ride_id: ride_id.clone(),
                        latitude: update.latitude,
                        longitude: update.longitude,
                        recorded_at: update.recorded_at,
                        interval_secs,
                    });
                    return CycleOutcome::Delivered;
                }

                AttemptResult::Failed { message, fatal } => {
                    let next_delay = self.policy.delay_for_attempt(attempt);
                    let will_retry = !fatal && next_delay.is_some();

                    warn!(
                        ride_id = %ride_id,
                        attempt,
                        will_retry,
                        "Update attempt failed: {}",
                        message
                    );
                    self.emit(TrackingEvent::UpdateFailed {
                        ride_id: ride_id.clone(),
                        message,
                        will_retry,
                        retry_count: attempt,
                    });

                    if !will_retry {
                        break;
                    }

                    // next_delay is Some here by the will_retry check
                    if let Some(delay) = next_delay {
                        if !self.sleep_cancellable(delay, cancel).await {
                            return CycleOutcome::Cancelled;
                        }
                    }
                }
            }
        }

        let (failures, transition) = self
            .session
            .record_failed_cycle(self.config.failure_threshold);
        warn!(
            ride_id = %ride_id,
            consecutive_failures = failures,
            "Update cycle failed after exhausting attempts"
        );

        if let Some((old, new)) = transition {
            self.emit(TrackingEvent::StatusChanged {
                ride_id: ride_id.clone(),
                old,
                new,
                message: Some(format!("{} consecutive failed update cycles", failures)),
            });
        }

        CycleOutcome::Failed
    }

    /// One attempt: bounded acquisition, interval adaptation, one send.
    async fn attempt_once(&self) -> AttemptResult {
        let acquired = tokio::time::timeout(self.config.location_timeout, self.geolocator.acquire());
        let sample = match acquired.await {
            Ok(Ok(sample)) => sample,
            Ok(Err(err)) => {
                return AttemptResult::Failed {
                    message: format!("location acquisition failed: {}", err),
                    fatal: false,
                };
            }
            Err(_) => {
                let err = GeolocateError::Timeout {
                    timeout_secs: self.config.location_timeout.as_secs(),
                };
                return AttemptResult::Failed {
                    message: format!("location acquisition failed: {}", err),
                    fatal: false,
                };
            }
        };

        // Adapt the interval before sending so the emitted event carries
        // the cadence this cycle actually settled on
        let here = Coordinates::new(sample.latitude, sample.longitude);
        let distance_m = self
            .session
            .destination()
            .map(|destination| geo::haversine_distance_m(here, destination));
        let interval = self.config.interval_for_distance(distance_m);
        self.session.set_current_interval(interval);

        if let Some(distance_m) = distance_m {
            debug!(
                ride_id = %self.session.ride_id(),
                distance_m = distance_m.round(),
                interval_secs = interval.as_secs(),
                "Distance to destination"
            );
        }

        let update = LocationUpdate::from_sample(self.session.ride_id(), &sample);
        match self.transport.send(&update).await {
            SendOutcome::Delivered => AttemptResult::Delivered(update),
            SendOutcome::Unauthorized => AttemptResult::Failed {
                message: "update rejected: unauthorized, re-authentication required".to_string(),
                fatal: true,
            },
            SendOutcome::InvalidRideState => AttemptResult::Failed {
                message: "update rejected: ride not in a trackable state".to_string(),
                fatal: false,
            },
            SendOutcome::RateLimited => AttemptResult::Failed {
                message: "update rejected: rate limited".to_string(),
                fatal: false,
            },
            SendOutcome::NetworkFailure(reason) => AttemptResult::Failed {
                message: format!("network failure: {}", reason),
                fatal: false,
            },
        }
    }

    /// Sleep that loses to cancellation. Returns false when cancelled.
    async fn sleep_cancellable(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn emit(&self, event: TrackingEvent) {
        // Nobody listening is fine; events are telemetry
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{BoxFuture, LocationSample};
    use crate::tracking::session::TrackingStatus;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Transport that replays a scripted list of outcomes, then delivers.
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<SendOutcome>>,
        sent: Mutex<Vec<LocationUpdate>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<SendOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    impl UpdateTransport for ScriptedTransport {
        fn send<'a>(&'a self, update: &'a LocationUpdate) -> BoxFuture<'a, SendOutcome> {
            self.sent.lock().push(update.clone());
            let outcome = self
                .outcomes
                .lock()
                .pop_front()
                .unwrap_or(SendOutcome::Delivered);
            Box::pin(async move { outcome })
        }
    }

    /// Geolocator pinned to one position.
    struct FixedGeolocator {
        latitude: f64,
        longitude: f64,
    }

    impl Geolocator for FixedGeolocator {
        fn acquire(&self) -> BoxFuture<'_, Result<LocationSample, GeolocateError>> {
            Box::pin(async move { Ok(LocationSample::new(self.latitude, self.longitude)) })
        }
    }

    /// Geolocator that always fails.
    struct BrokenGeolocator;

    impl Geolocator for BrokenGeolocator {
        fn acquire(&self) -> BoxFuture<'_, Result<LocationSample, GeolocateError>> {
            Box::pin(async move { Err(GeolocateError::Unavailable("no fix".to_string())) })
        }
    }

    fn fast_config() -> TrackingConfig {
        TrackingConfig::default()
            .with_intervals(Duration::from_millis(40), Duration::from_millis(20))
            .with_retry(2, Duration::from_millis(10))
            .with_startup_grace(Duration::from_millis(1))
            .with_location_timeout(Duration::from_millis(200))
    }

    struct Harness {
        session: Arc<SessionState>,
        cancel: CancellationToken,
        events: broadcast::Receiver<TrackingEvent>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_worker<T: UpdateTransport + 'static>(
        config: TrackingConfig,
        geolocator: Arc<dyn Geolocator>,
        transport: Arc<T>,
        destination: Option<Coordinates>,
    ) -> Harness {
        let transport: Arc<dyn UpdateTransport> = transport;
        let session = Arc::new(SessionState::new("ride-1", &config, destination));
        let (events_tx, events_rx) = broadcast::channel(64);
        let worker = TrackingWorker::new(
            Arc::clone(&session),
            config,
            geolocator,
            transport,
            events_tx,
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        Harness {
            session,
            cancel,
            events: events_rx,
            task,
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<TrackingEvent>) -> TrackingEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn shutdown(harness: Harness) {
        harness.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), harness.task).await;
    }

    #[tokio::test]
    async fn test_delivered_update_emits_update_sent() {
        let transport = ScriptedTransport::new(vec![]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.7128,
            longitude: -74.006,
        });
        let mut harness = spawn_worker(fast_config(), geolocator, Arc::clone(&transport), None);

        let event = next_event(&mut harness.events).await;
        match event {
            TrackingEvent::UpdateSent {
                ride_id,
                latitude,
                interval_secs,
                ..
            } => {
                assert_eq!(ride_id, "ride-1");
                assert_eq!(latitude, 40.7128);
                // No destination set, so the default interval applies
                assert_eq!(interval_secs, 0); // 40ms truncates to 0 whole seconds
            }
            other => panic!("expected UpdateSent, got {:?}", other),
        }

        assert_eq!(harness.session.consecutive_failures(), 0);
        shutdown(harness).await;
        assert!(transport.sent_count() >= 1);
    }

    #[tokio::test]
    async fn test_retry_within_budget_recovers_cycle() {
        let transport = ScriptedTransport::new(vec![SendOutcome::NetworkFailure(
            "connection reset".to_string(),
        )]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.0,
            longitude: -74.0,
        });
        let mut harness = spawn_worker(fast_config(), geolocator, Arc::clone(&transport), None);

        let first = next_event(&mut harness.events).await;
        match first {
            TrackingEvent::UpdateFailed {
                will_retry,
                retry_count,
                message,
                ..
            } => {
                assert!(will_retry);
                assert_eq!(retry_count, 1);
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected UpdateFailed, got {:?}", other),
        }

        let second = next_event(&mut harness.events).await;
        assert!(matches!(second, TrackingEvent::UpdateSent { .. }));

        // Retry succeeded, so the cycle counts as a success
        assert_eq!(harness.session.consecutive_failures(), 0);
        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_invalid_ride_state_retried_within_cycle() {
        // The startup race: the server-side status transition has not landed
        // yet, so the first send bounces and the retry goes through
        let transport = ScriptedTransport::new(vec![SendOutcome::InvalidRideState]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.0,
            longitude: -74.0,
        });
        let mut harness = spawn_worker(fast_config(), geolocator, Arc::clone(&transport), None);

        let first = next_event(&mut harness.events).await;
        match first {
            TrackingEvent::UpdateFailed {
                will_retry,
                message,
                ..
            } => {
                assert!(will_retry);
                assert!(message.contains("not in a trackable state"));
            }
            other => panic!("expected UpdateFailed, got {:?}", other),
        }

        let second = next_event(&mut harness.events).await;
        assert!(matches!(second, TrackingEvent::UpdateSent { .. }));

        assert_eq!(harness.session.consecutive_failures(), 0);
        assert_eq!(harness.session.status(), TrackingStatus::Active);
        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_exhausted_budget_counts_one_failed_cycle() {
        let transport = ScriptedTransport::new(vec![
            SendOutcome::NetworkFailure("timeout".to_string()),
            SendOutcome::NetworkFailure("timeout".to_string()),
        ]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.0,
            longitude: -74.0,
        });
        let mut harness = spawn_worker(fast_config(), geolocator, Arc::clone(&transport), None);

        let first = next_event(&mut harness.events).await;
        assert!(matches!(
            first,
            TrackingEvent::UpdateFailed {
                will_retry: true,
                retry_count: 1,
                ..
            }
        ));

        let second = next_event(&mut harness.events).await;
        assert!(matches!(
            second,
            TrackingEvent::UpdateFailed {
                will_retry: false,
                retry_count: 2,
                ..
            }
        ));

        harness.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), harness.task).await;

        // Two attempts, one failed cycle, still Active below the threshold
        assert_eq!(harness.session.consecutive_failures(), 1);
        assert_eq!(harness.session.status(), TrackingStatus::Active);
    }

    #[tokio::test]
    async fn test_unauthorized_ends_cycle_without_retry() {
        let transport = ScriptedTransport::new(vec![SendOutcome::Unauthorized]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.0,
            longitude: -74.0,
        });
        let mut harness = spawn_worker(fast_config(), geolocator, Arc::clone(&transport), None);

        let event = next_event(&mut harness.events).await;
        match event {
            TrackingEvent::UpdateFailed {
                will_retry,
                message,
                ..
            } => {
                // Budget remained, but unauthorized is not retried
                assert!(!will_retry);
                assert!(message.contains("re-authentication"));
            }
            other => panic!("expected UpdateFailed, got {:?}", other),
        }

        // Give the loop a moment; the next send would be the next cycle
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(harness.session.consecutive_failures(), 1);
        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_acquisition_failure_spends_attempts_without_sending() {
        let transport = ScriptedTransport::new(vec![]);
        let mut harness = spawn_worker(
            fast_config(),
            Arc::new(BrokenGeolocator),
            Arc::clone(&transport),
            None,
        );

        let first = next_event(&mut harness.events).await;
        match first {
            TrackingEvent::UpdateFailed {
                will_retry,
                message,
                ..
            } => {
                assert!(will_retry);
                assert!(message.contains("location acquisition failed"));
            }
            other => panic!("expected UpdateFailed, got {:?}", other),
        }

        let second = next_event(&mut harness.events).await;
        assert!(matches!(
            second,
            TrackingEvent::UpdateFailed {
                will_retry: false,
                ..
            }
        ));

        harness.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), harness.task).await;

        // The network was never touched
        assert_eq!(transport.sent_count(), 0);
        assert_eq!(harness.session.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_proximity_switches_to_faster_interval() {
        let transport = ScriptedTransport::new(vec![]);
        // ~400m north of the destination
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 52.5236,
            longitude: 13.4050,
        });
        let destination = Coordinates::new(52.5200, 13.4050);

        let config = fast_config();
        let proximity_interval = config.proximity_interval;
        let mut harness = spawn_worker(
            config,
            geolocator,
            Arc::clone(&transport),
            Some(destination),
        );

        let event = next_event(&mut harness.events).await;
        assert!(matches!(event, TrackingEvent::UpdateSent { .. }));
        assert_eq!(harness.session.current_interval(), proximity_interval);
        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_far_destination_keeps_default_interval() {
        let transport = ScriptedTransport::new(vec![]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 52.5200,
            longitude: 13.4050,
        });
        // ~5km away
        let destination = Coordinates::new(52.5650, 13.4050);

        let config = fast_config();
        let default_interval = config.default_interval;
        let mut harness = spawn_worker(
            config,
            geolocator,
            Arc::clone(&transport),
            Some(destination),
        );

        let event = next_event(&mut harness.events).await;
        assert!(matches!(event, TrackingEvent::UpdateSent { .. }));
        assert_eq!(harness.session.current_interval(), default_interval);
        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_degradation_and_recovery_across_cycles() {
        // Two failing cycles (budget 1), then successes
        let transport = ScriptedTransport::new(vec![
            SendOutcome::NetworkFailure("offline".to_string()),
            SendOutcome::NetworkFailure("offline".to_string()),
        ]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.0,
            longitude: -74.0,
        });
        let config = fast_config()
            .with_retry(1, Duration::from_millis(10))
            .with_failure_threshold(2);
        let mut harness = spawn_worker(config, geolocator, Arc::clone(&transport), None);

        let mut saw_degradation = false;
        let mut saw_recovery = false;
        for _ in 0..8 {
            match next_event(&mut harness.events).await {
                TrackingEvent::StatusChanged { old, new, .. }
                    if old == TrackingStatus::Active && new == TrackingStatus::Error =>
                {
                    saw_degradation = true;
                }
                TrackingEvent::StatusChanged { old, new, .. }
                    if old == TrackingStatus::Error && new == TrackingStatus::Active =>
                {
                    saw_recovery = true;
                    break;
                }
                _ => {}
            }
        }

        assert!(saw_degradation, "session never degraded to Error");
        assert!(saw_recovery, "session never recovered to Active");
        assert_eq!(harness.session.consecutive_failures(), 0);
        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_cancellation_during_retry_delay_exits_quietly() {
        let transport = ScriptedTransport::new(vec![SendOutcome::NetworkFailure(
            "offline".to_string(),
        )]);
        let geolocator = Arc::new(FixedGeolocator {
            latitude: 40.0,
            longitude: -74.0,
        });
        // Long retry delay so cancellation lands inside it
        let config = fast_config().with_retry(2, Duration::from_secs(30));
        let mut harness = spawn_worker(config, geolocator, Arc::clone(&transport), None);

        let first = next_event(&mut harness.events).await;
        assert!(matches!(
            first,
            TrackingEvent::UpdateFailed {
                will_retry: true,
                ..
            }
        ));

        harness.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), harness.task)
            .await
            .expect("loop did not exit after cancellation")
            .unwrap();

        // Cancellation is silent: no further events were emitted. The worker
        // held the only sender, so a drained channel reports Closed once the
        // task has exited; buffered events would still be yielded first.
        assert!(matches!(
            harness.events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
        assert_eq!(transport.sent_count(), 1);
    }
}
