//! Simulated platform capabilities for CLI runs.
//!
//! Stands in for the mobile platform so the tracking loop can be exercised
//! from a terminal: a geolocator that walks a straight line from start to
//! destination at a fixed speed with optional GPS jitter, a backend
//! transport with injectable failures, and a permission gate with a fixed
//! answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

use ridetrace::geo::{haversine_distance_m, initial_bearing_deg, Coordinates};
use ridetrace::location::{
    BoxFuture, GeolocateError, Geolocator, LocationSample, PermissionGate, PermissionStatus,
};
use ridetrace::transport::{LocationUpdate, SendOutcome, UpdateTransport};

/// Meters of northward travel per degree of latitude.
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Round-trip latency of the simulated backend.
const BACKEND_LATENCY: Duration = Duration::from_millis(120);

/// Advance `from` along the straight line to `to` by `distance_m`,
/// stopping at `to`.
fn step_toward(from: Coordinates, to: Coordinates, distance_m: f64) -> Coordinates {
    if distance_m <= 0.0 {
        return from;
    }
    let remaining = haversine_distance_m(from, to);
    if remaining <= distance_m {
        return to;
    }
    let fraction = distance_m / remaining;
    // Take the short way around when the route crosses the antimeridian
    let mut dlon = to.longitude - from.longitude;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let mut longitude = from.longitude + dlon * fraction;
    if longitude > 180.0 {
        longitude -= 360.0;
    } else if longitude < -180.0 {
        longitude += 360.0;
    }
    Coordinates::new(
        from.latitude + (to.latitude - from.latitude) * fraction,
        longitude,
    )
}

/// Displace a position by up to `jitter_m` meters on each axis.
fn jittered(rng: &mut StdRng, position: Coordinates, jitter_m: f64) -> Coordinates {
    if jitter_m <= 0.0 {
        return position;
    }
    let dlat = rng.random_range(-jitter_m..=jitter_m) / METERS_PER_DEGREE_LAT;
    let lon_scale = METERS_PER_DEGREE_LAT * position.latitude.to_radians().cos().abs().max(0.01);
    let dlon = rng.random_range(-jitter_m..=jitter_m) / lon_scale;
    Coordinates::new(position.latitude + dlat, position.longitude + dlon)
}

struct WalkState {
    position: Coordinates,
    last_fix_at: Option<Instant>,
    rng: StdRng,
}

/// Geolocator that drives a straight route in real time.
///
/// Each acquired fix advances the position by elapsed wall time times the
/// configured speed, clamped at the destination.
pub struct SimulatedGeolocator {
    destination: Coordinates,
    speed_mps: f64,
    jitter_m: f64,
    state: Mutex<WalkState>,
}

impl SimulatedGeolocator {
    pub fn new(
        start: Coordinates,
        destination: Coordinates,
        speed_mps: f64,
        jitter_m: f64,
    ) -> Self {
        Self {
            destination,
            speed_mps,
            jitter_m,
            state: Mutex::new(WalkState {
                position: start,
                last_fix_at: None,
                rng: StdRng::from_os_rng(),
            }),
        }
    }

    /// Current true position (without jitter).
    pub async fn position(&self) -> Coordinates {
        self.state.lock().await.position
    }
}

impl Geolocator for SimulatedGeolocator {
    fn acquire(&self) -> BoxFuture<'_, Result<LocationSample, GeolocateError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;

            let now = Instant::now();
            if let Some(last) = state.last_fix_at {
                let travelled = self.speed_mps * now.duration_since(last).as_secs_f64();
                state.position = step_toward(state.position, self.destination, travelled);
            }
            state.last_fix_at = Some(now);

            let position = state.position;
            let reported = jittered(&mut state.rng, position, self.jitter_m);
            let arrived = position == self.destination;

            let mut sample = LocationSample::new(reported.latitude, reported.longitude);
            sample.heading_deg = Some(initial_bearing_deg(position, self.destination));
            sample.speed_mps = Some(if arrived { 0.0 } else { self.speed_mps });
            sample.accuracy_m = Some((self.jitter_m * 1.5).max(3.0));
            Ok(sample)
        })
    }
}

/// Backend stub that accepts updates, with a configurable failure rate.
pub struct SimulatedTransport {
    failure_rate: f64,
    rng: Mutex<StdRng>,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

impl SimulatedTransport {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_os_rng()),
            delivered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl UpdateTransport for SimulatedTransport {
    fn send<'a>(&'a self, update: &'a LocationUpdate) -> BoxFuture<'a, SendOutcome> {
        Box::pin(async move {
            tokio::time::sleep(BACKEND_LATENCY).await;

            let failed = self.rng.lock().await.random_bool(self.failure_rate);
            if failed {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                SendOutcome::NetworkFailure("simulated network outage".to_string())
            } else {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    ride_id = %update.ride_id,
                    latitude = update.latitude,
                    longitude = update.longitude,
                    "Simulated backend accepted update"
                );
                SendOutcome::Delivered
            }
        })
    }
}

/// Permission gate with a fixed answer.
pub struct SimulatedPermissionGate {
    status: PermissionStatus,
}

impl SimulatedPermissionGate {
    pub fn granted() -> Self {
        Self {
            status: PermissionStatus::Granted,
        }
    }

    pub fn denied() -> Self {
        Self {
            status: PermissionStatus::Denied,
        }
    }
}

impl PermissionGate for SimulatedPermissionGate {
    fn ensure_granted(&self) -> BoxFuture<'_, PermissionStatus> {
        let status = self.status;
        Box::pin(async move { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMES_SQUARE: Coordinates = Coordinates {
        latitude: 40.758,
        longitude: -73.9855,
    };
    const CITY_HALL: Coordinates = Coordinates {
        latitude: 40.7128,
        longitude: -74.006,
    };

    #[test]
    fn test_step_toward_zero_distance_stays_put() {
        let stepped = step_toward(TIMES_SQUARE, CITY_HALL, 0.0);
        assert_eq!(stepped, TIMES_SQUARE);
    }

    #[test]
    fn test_step_toward_clamps_at_destination() {
        let stepped = step_toward(TIMES_SQUARE, CITY_HALL, 1_000_000.0);
        assert_eq!(stepped, CITY_HALL);
    }

    #[test]
    fn test_step_toward_advances_by_roughly_the_step() {
        let before = haversine_distance_m(TIMES_SQUARE, CITY_HALL);
        let stepped = step_toward(TIMES_SQUARE, CITY_HALL, 1000.0);
        let after = haversine_distance_m(stepped, CITY_HALL);

        assert!(after < before);
        let advanced = before - after;
        assert!(
            (900.0..1100.0).contains(&advanced),
            "advanced {} m, wanted ~1000 m",
            advanced
        );
    }

    #[test]
    fn test_step_toward_crosses_the_antimeridian_the_short_way() {
        // Fiji to French Polynesia: 268 degrees apart naively, 92 the short
        // way east across the date line
        let from = Coordinates::new(0.0, 148.069);
        let to = Coordinates::new(0.0, -119.937);

        let before = haversine_distance_m(from, to);
        let stepped = step_toward(from, to, 2141.7);
        let after = haversine_distance_m(stepped, to);

        assert!(
            after < before,
            "step widened the gap: {} m -> {} m",
            before,
            after
        );
        assert!(stepped.longitude > from.longitude, "stepped west, not east");
    }

    #[test]
    fn test_step_toward_wraps_longitude_past_the_date_line() {
        let from = Coordinates::new(10.0, 179.9);
        let to = Coordinates::new(10.0, -179.5);

        // ~0.2 degrees of longitude at this latitude, enough to cross 180
        let stepped = step_toward(from, to, 22_000.0);

        assert!((-180.0..=180.0).contains(&stepped.longitude));
        assert!(stepped.longitude < -179.5 + 0.1);
        let after = haversine_distance_m(stepped, to);
        assert!(after < haversine_distance_m(from, to));
    }

    #[test]
    fn test_jitter_stays_near_the_position() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let moved = jittered(&mut rng, TIMES_SQUARE, 10.0);
            let displacement = haversine_distance_m(TIMES_SQUARE, moved);
            assert!(
                displacement <= 30.0,
                "displacement {} m exceeds jitter bound",
                displacement
            );
        }
    }

    #[test]
    fn test_jitter_disabled_returns_position_unchanged() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(jittered(&mut rng, TIMES_SQUARE, 0.0), TIMES_SQUARE);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_step_never_increases_distance(
                from_lat in -60.0..60.0_f64,
                from_lon in -170.0..170.0_f64,
                to_lat in -60.0..60.0_f64,
                to_lon in -170.0..170.0_f64,
                step in 0.0..5000.0_f64,
            ) {
                let from = Coordinates::new(from_lat, from_lon);
                let to = Coordinates::new(to_lat, to_lon);

                let before = haversine_distance_m(from, to);
                let stepped = step_toward(from, to, step);
                let after = haversine_distance_m(stepped, to);

                prop_assert!(after <= before + 1e-6);
            }
        }
    }
}
