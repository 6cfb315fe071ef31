//! Great-circle geometry for proximity decisions.
//!
//! The tracking loop compares driver-to-destination distance against a
//! proximity threshold every cycle, so the distance function here is the
//! one piece of math the whole subsystem leans on.
//!
//! # Design
//!
//! - Haversine distance on a spherical Earth (mean radius, meters)
//! - Identical coordinates return exactly 0.0
//! - Stable near antipodal points (no NaN from rounding)
//! - Flat-earth bearing kept for simulated-route heading only

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates from decimal degrees.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance between two points in meters (Haversine formula).
pub fn haversine_distance_m(from: Coordinates, to: Coordinates) -> f64 {
    if from == to {
        return 0.0;
    }

    let lat1_rad = from.latitude.to_radians();
    let lat2_rad = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push a past 1.0 near antipodal points; sqrt(1 - a) would NaN
    let a = a.min(1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Bearing from one point toward another (flat-earth approximation).
///
/// Returns bearing in degrees (0-360), where 0 = North, 90 = East. Good
/// enough for cosmetic heading on simulated routes; not for navigation.
pub fn initial_bearing_deg(from: Coordinates, to: Coordinates) -> f64 {
    let dlat = to.latitude - from.latitude;
    let dlon = to.longitude - from.longitude;

    let bearing_deg = dlon.atan2(dlat).to_degrees();

    // Normalize to 0-360
    if bearing_deg < 0.0 {
        bearing_deg + 360.0
    } else {
        bearing_deg
    }
}
