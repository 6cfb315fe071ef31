//! INI-backed persistence for the tracking configuration.
//!
//! The config file lives under the user config directory
//! (`~/.config/ridetrace/config.ini` on Linux) and holds one `[tracking]`
//! section. Missing file or missing keys fall back to defaults; present
//! keys with garbage values are errors so typos do not silently become
//! default behavior.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use super::{ConfigError, TrackingConfig};

/// INI section holding all tracking options.
const SECTION: &str = "tracking";

/// Path of the configuration file under the user config directory.
///
/// Falls back to a file in the working directory when the platform
/// reports no config directory.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ridetrace").join("config.ini"))
        .unwrap_or_else(|| PathBuf::from("ridetrace-config.ini"))
}

/// The on-disk configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// Tracking loop options.
    pub tracking: TrackingConfig,
}

impl ConfigFile {
    /// Load from the default path. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let doc = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(parse) => ConfigError::Parse(parse.to_string()),
        })?;

        let defaults = TrackingConfig::default();
        let tracking = TrackingConfig {
            default_interval: Duration::from_secs(read_u64(
                &doc,
                "default_interval_secs",
                defaults.default_interval.as_secs(),
            )?),
            proximity_interval: Duration::from_secs(read_u64(
                &doc,
                "proximity_interval_secs",
                defaults.proximity_interval.as_secs(),
            )?),
            proximity_threshold_m: read_f64(
                &doc,
                "proximity_threshold_m",
                defaults.proximity_threshold_m,
            )?,
            max_retry_attempts: read_u32(
                &doc,
                "max_retry_attempts",
                defaults.max_retry_attempts,
            )?,
            retry_delay: Duration::from_millis(read_u64(
                &doc,
                "retry_delay_ms",
                defaults.retry_delay.as_millis() as u64,
            )?),
            location_timeout: Duration::from_secs(read_u64(
                &doc,
                "location_timeout_secs",
                defaults.location_timeout.as_secs(),
            )?),
            startup_grace: Duration::from_secs(read_u64(
                &doc,
                "startup_grace_secs",
                defaults.startup_grace.as_secs(),
            )?),
            failure_threshold: read_u32(&doc, "failure_threshold", defaults.failure_threshold)?,
            stop_grace: Duration::from_secs(read_u64(
                &doc,
                "stop_grace_secs",
                defaults.stop_grace.as_secs(),
            )?),
        };

        tracking.validate()?;
        Ok(Self { tracking })
    }

    /// Save to the default path, creating parent directories as needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let t = &self.tracking;
        let mut doc = Ini::new();
        doc.with_section(Some(SECTION))
            .set(
                "default_interval_secs",
                t.default_interval.as_secs().to_string(),
            )
            .set(
                "proximity_interval_secs",
                t.proximity_interval.as_secs().to_string(),
            )
            .set(
                "proximity_threshold_m",
                t.proximity_threshold_m.to_string(),
            )
            .set("max_retry_attempts", t.max_retry_attempts.to_string())
            .set("retry_delay_ms", t.retry_delay.as_millis().to_string())
            .set(
                "location_timeout_secs",
                t.location_timeout.as_secs().to_string(),
            )
            .set("startup_grace_secs", t.startup_grace.as_secs().to_string())
            .set("failure_threshold", t.failure_threshold.to_string())
            .set("stop_grace_secs", t.stop_grace.as_secs().to_string());

        doc.write_to_file(path)?;
        Ok(())
    }
}

fn read_u64(doc: &Ini, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match doc.get_from(Some(SECTION), key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key,
                reason: format!("expected a whole number, got '{}'", raw),
            }),
    }
}

fn read_u32(doc: &Ini, key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match doc.get_from(Some(SECTION), key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key,
                reason: format!("expected a whole number, got '{}'", raw),
            }),
    }
}

fn read_f64(doc: &Ini, key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match doc.get_from(Some(SECTION), key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key,
                reason: format!("expected a number, got '{}'", raw),
            }),
    }
}

/// A recognized configuration key, addressable from the command line as
/// `tracking.<key>` (the bare key is accepted too).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DefaultIntervalSecs,
    ProximityIntervalSecs,
    ProximityThresholdM,
    MaxRetryAttempts,
    RetryDelayMs,
    LocationTimeoutSecs,
    StartupGraceSecs,
    FailureThreshold,
    StopGraceSecs,
}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::DefaultIntervalSecs,
            ConfigKey::ProximityIntervalSecs,
            ConfigKey::ProximityThresholdM,
            ConfigKey::MaxRetryAttempts,
            ConfigKey::RetryDelayMs,
            ConfigKey::LocationTimeoutSecs,
            ConfigKey::StartupGraceSecs,
            ConfigKey::FailureThreshold,
            ConfigKey::StopGraceSecs,
        ]
    }

    /// INI section this key belongs to.
    pub fn section(&self) -> &'static str {
        SECTION
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::DefaultIntervalSecs => "default_interval_secs",
            ConfigKey::ProximityIntervalSecs => "proximity_interval_secs",
            ConfigKey::ProximityThresholdM => "proximity_threshold_m",
            ConfigKey::MaxRetryAttempts => "max_retry_attempts",
            ConfigKey::RetryDelayMs => "retry_delay_ms",
            ConfigKey::LocationTimeoutSecs => "location_timeout_secs",
            ConfigKey::StartupGraceSecs => "startup_grace_secs",
            ConfigKey::FailureThreshold => "failure_threshold",
            ConfigKey::StopGraceSecs => "stop_grace_secs",
        }
    }

    /// Fully qualified `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string.
    pub fn get(&self, config: &ConfigFile) -> String {
        let t = &config.tracking;
        match self {
            ConfigKey::DefaultIntervalSecs => t.default_interval.as_secs().to_string(),
            ConfigKey::ProximityIntervalSecs => t.proximity_interval.as_secs().to_string(),
            ConfigKey::ProximityThresholdM => t.proximity_threshold_m.to_string(),
            ConfigKey::MaxRetryAttempts => t.max_retry_attempts.to_string(),
            ConfigKey::RetryDelayMs => t.retry_delay.as_millis().to_string(),
            ConfigKey::LocationTimeoutSecs => t.location_timeout.as_secs().to_string(),
            ConfigKey::StartupGraceSecs => t.startup_grace.as_secs().to_string(),
            ConfigKey::FailureThreshold => t.failure_threshold.to_string(),
            ConfigKey::StopGraceSecs => t.stop_grace.as_secs().to_string(),
        }
    }

    /// Parse and apply a new value, re-validating the whole config so a
    /// single `set` cannot leave the file in a rejected state.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let mut updated = config.tracking.clone();
        let raw = value.trim();

        match self {
            ConfigKey::DefaultIntervalSecs => {
                updated.default_interval = Duration::from_secs(parse_u64(self, raw)?);
            }
            ConfigKey::ProximityIntervalSecs => {
                updated.proximity_interval = Duration::from_secs(parse_u64(self, raw)?);
            }
            ConfigKey::ProximityThresholdM => {
                updated.proximity_threshold_m =
                    raw.parse().map_err(|_| ConfigError::InvalidValue {
                        key: self.key_name(),
                        reason: format!("expected a number, got '{}'", raw),
                    })?;
            }
            ConfigKey::MaxRetryAttempts => {
                updated.max_retry_attempts = parse_u32(self, raw)?;
            }
            ConfigKey::RetryDelayMs => {
                updated.retry_delay = Duration::from_millis(parse_u64(self, raw)?);
            }
            ConfigKey::LocationTimeoutSecs => {
                updated.location_timeout = Duration::from_secs(parse_u64(self, raw)?);
            }
            ConfigKey::StartupGraceSecs => {
                updated.startup_grace = Duration::from_secs(parse_u64(self, raw)?);
            }
            ConfigKey::FailureThreshold => {
                updated.failure_threshold = parse_u32(self, raw)?;
            }
            ConfigKey::StopGraceSecs => {
                updated.stop_grace = Duration::from_secs(parse_u64(self, raw)?);
            }
        }

        updated.validate()?;
        config.tracking = updated;
        Ok(())
    }
}

fn parse_u64(key: &ConfigKey, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.key_name(),
        reason: format!("expected a whole number, got '{}'", raw),
    })
}

fn parse_u32(key: &ConfigKey, raw: &str) -> Result<u32, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.key_name(),
        reason: format!("expected a whole number, got '{}'", raw),
    })
}

impl FromStr for ConfigKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s
            .strip_prefix("tracking.")
            .unwrap_or(s)
            .trim()
            .to_lowercase();

        ConfigKey::all()
            .iter()
            .find(|key| key.key_name() == bare)
            .copied()
            .ok_or(())
    }
}
