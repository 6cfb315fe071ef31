//! Configuration for the tracking subsystem.
//!
//! All timing and budget knobs for the per-ride sampling loop live in
//! `TrackingConfig`. Defaults are chosen for a phone on a cellular
//! connection: frequent enough for a dispatcher map, sparse enough to not
//! drain a battery over a shift.
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [tracking]
//! default_interval_secs = 30
//! proximity_interval_secs = 15
//! proximity_threshold_m = 500
//! max_retry_attempts = 2
//! retry_delay_ms = 1000
//! location_timeout_secs = 10
//! startup_grace_secs = 2
//! failure_threshold = 3
//! stop_grace_secs = 5
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod file;

pub use file::{config_file_path, ConfigFile, ConfigKey};

/// Default seconds between updates when far from the destination.
const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Default seconds between updates when close to the destination.
const PROXIMITY_INTERVAL_SECS: u64 = 15;

/// Default distance (meters) at which the faster interval kicks in.
const PROXIMITY_THRESHOLD_M: f64 = 500.0;

/// Default delivery attempts per cycle, including the initial attempt.
const MAX_RETRY_ATTEMPTS: u32 = 2;

/// Default milliseconds between delivery attempts within a cycle.
const RETRY_DELAY_MS: u64 = 1000;

/// Default seconds to wait for a GPS fix before giving up on the attempt.
const LOCATION_TIMEOUT_SECS: u64 = 10;

/// Default seconds to wait before the first send of a new session.
const STARTUP_GRACE_SECS: u64 = 2;

/// Default consecutive failed cycles before a session degrades to Error.
const FAILURE_THRESHOLD: u32 = 3;

/// Default seconds stop waits for a loop to exit before giving up on it.
const STOP_GRACE_SECS: u64 = 5;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading or writing the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file exists but could not be parsed as INI.
    #[error("could not parse config file: {0}")]
    Parse(String),

    /// A recognized option holds a value outside its accepted range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Tuning for the per-ride sampling loop.
///
/// Intervals are stored as `Duration`; the INI layer maps them from the
/// numeric seconds/milliseconds keys shown in the module example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Time between updates when far from the destination.
    ///
    /// Must be longer than `proximity_interval`.
    pub default_interval: Duration,

    /// Time between updates when within `proximity_threshold_m` of the
    /// destination. Faster cadence so the dispatcher map stays honest
    /// during the approach.
    pub proximity_interval: Duration,

    /// Distance to destination (meters) at or below which the proximity
    /// interval applies. The boundary itself counts as close.
    pub proximity_threshold_m: f64,

    /// Delivery attempts per cycle, including the initial attempt.
    ///
    /// 2 means one retry after the first failure. Range: 1 - 5.
    pub max_retry_attempts: u32,

    /// Delay between delivery attempts within a cycle.
    pub retry_delay: Duration,

    /// How long to wait for a GPS fix. A fix that takes longer costs the
    /// cycle one attempt, the same as a failed send.
    pub location_timeout: Duration,

    /// Pause before the first send of a new session, so the server-side
    /// ride-status transition can land first.
    pub startup_grace: Duration,

    /// Consecutive failed cycles before the session degrades to Error.
    pub failure_threshold: u32,

    /// How long `stop_tracking` waits for the loop to acknowledge
    /// cancellation before abandoning the join.
    pub stop_grace: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            proximity_interval: Duration::from_secs(PROXIMITY_INTERVAL_SECS),
            proximity_threshold_m: PROXIMITY_THRESHOLD_M,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            location_timeout: Duration::from_secs(LOCATION_TIMEOUT_SECS),
            startup_grace: Duration::from_secs(STARTUP_GRACE_SECS),
            failure_threshold: FAILURE_THRESHOLD,
            stop_grace: Duration::from_secs(STOP_GRACE_SECS),
        }
    }
}

impl TrackingConfig {
    /// Set both sampling intervals.
    pub fn with_intervals(mut self, default: Duration, proximity: Duration) -> Self {
        self.default_interval = default;
        self.proximity_interval = proximity;
        self
    }

    /// Set the proximity threshold in meters.
    pub fn with_proximity_threshold_m(mut self, threshold_m: f64) -> Self {
        self.proximity_threshold_m = threshold_m;
        self
    }

    /// Set the per-cycle retry budget and inter-attempt delay.
    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_retry_attempts = max_attempts;
        self.retry_delay = delay;
        self
    }

    /// Set the GPS acquisition timeout.
    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    /// Set the pre-first-send grace delay.
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Set the consecutive-failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long stop waits for a loop to exit.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Pick the sampling interval for a cycle.
    ///
    /// `None` means no destination is set, which always uses the default
    /// interval. The threshold boundary is inclusive: exactly on it counts
    /// as close.
    pub fn interval_for_distance(&self, distance_m: Option<f64>) -> Duration {
        match distance_m {
            Some(d) if d <= self.proximity_threshold_m => self.proximity_interval,
            _ => self.default_interval,
        }
    }

    /// Check that all options are inside their accepted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "default_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.proximity_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "proximity_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.proximity_interval >= self.default_interval {
            return Err(ConfigError::InvalidValue {
                key: "proximity_interval_secs",
                reason: format!(
                    "{}s must be shorter than default_interval_secs {}s",
                    self.proximity_interval.as_secs(),
                    self.default_interval.as_secs()
                ),
            });
        }
        if !(self.proximity_threshold_m > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "proximity_threshold_m",
                reason: "must be a positive number".to_string(),
            });
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_retry_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.location_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "location_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackingConfig::default();
        assert_eq!(config.default_interval, Duration::from_secs(30));
        assert_eq!(config.proximity_interval, Duration::from_secs(15));
        assert_eq!(config.proximity_threshold_m, 500.0);
        assert_eq!(config.max_retry_attempts, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.location_timeout, Duration::from_secs(10));
        assert_eq!(config.startup_grace, Duration::from_secs(2));
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.stop_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_defaults_pass_validation() {
        assert!(TrackingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_interval_selection_far_from_destination() {
        let config = TrackingConfig::default();
        assert_eq!(
            config.interval_for_distance(Some(501.0)),
            config.default_interval
        );
        assert_eq!(
            config.interval_for_distance(Some(12_000.0)),
            config.default_interval
        );
    }

    #[test]
    fn test_interval_selection_near_destination() {
        let config = TrackingConfig::default();
        assert_eq!(
            config.interval_for_distance(Some(400.0)),
            config.proximity_interval
        );
        assert_eq!(
            config.interval_for_distance(Some(0.0)),
            config.proximity_interval
        );
    }

    #[test]
    fn test_interval_boundary_is_inclusive() {
        let config = TrackingConfig::default();
        // Exactly on the threshold counts as close
        assert_eq!(
            config.interval_for_distance(Some(500.0)),
            config.proximity_interval
        );
    }

    #[test]
    fn test_no_destination_uses_default_interval() {
        let config = TrackingConfig::default();
        assert_eq!(config.interval_for_distance(None), config.default_interval);
    }

    #[test]
    fn test_validation_rejects_inverted_intervals() {
        let config = TrackingConfig::default()
            .with_intervals(Duration::from_secs(10), Duration::from_secs(20));

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "proximity_interval_secs",
                ..
            }
        ));
    }

    #[test]
    fn test_validation_rejects_equal_intervals() {
        let config = TrackingConfig::default()
            .with_intervals(Duration::from_secs(20), Duration::from_secs(20));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let config = TrackingConfig::default().with_retry(0, Duration::from_millis(100));

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "max_retry_attempts",
                ..
            }
        ));
    }

    #[test]
    fn test_validation_rejects_zero_failure_threshold() {
        let config = TrackingConfig::default().with_failure_threshold(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nan_proximity_threshold() {
        let config = TrackingConfig::default().with_proximity_threshold_m(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders_chain() {
        let config = TrackingConfig::default()
            .with_intervals(Duration::from_secs(60), Duration::from_secs(20))
            .with_proximity_threshold_m(250.0)
            .with_retry(3, Duration::from_millis(500))
            .with_failure_threshold(5)
            .with_stop_grace(Duration::from_secs(2));

        assert_eq!(config.default_interval, Duration::from_secs(60));
        assert_eq!(config.proximity_interval, Duration::from_secs(20));
        assert_eq!(config.proximity_threshold_m, 250.0);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.stop_grace, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = TrackingConfig::default()
            .with_intervals(Duration::from_secs(60), Duration::from_secs(20))
            .with_retry(3, Duration::from_millis(500));

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"max_retry_attempts\":3"));

        let restored: TrackingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
