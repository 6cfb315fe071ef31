//! Shared CLI bootstrap.
//!
//! Long-running commands go through `CliRunner`, which installs logging and
//! loads the configuration file before the command does any work.

use tracing::info;

use ridetrace::config::{ConfigFile, TrackingConfig};
use ridetrace::log::{self, LogGuard};

use crate::error::CliError;

/// Bootstraps logging and configuration for a command.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: LogGuard,
}

impl CliRunner {
    /// Install logging and load the configuration file.
    pub fn new() -> Result<Self, CliError> {
        let log_guard = log::init_with_file(&log::default_log_dir())?;
        let config = ConfigFile::load()?;
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    /// Log the startup line every command begins with.
    pub fn log_startup(&self, command: &str) {
        info!(command, version = ridetrace::VERSION, "RideTrace CLI starting");
    }

    /// The loaded configuration file.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// The tracking options from the configuration file.
    pub fn tracking_config(&self) -> TrackingConfig {
        self.config.tracking.clone()
    }
}
