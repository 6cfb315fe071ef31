//! CLI error types.

use std::fmt;

use ridetrace::config::ConfigError;

/// Errors surfaced to the CLI user.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded, parsed or saved.
    Config(String),
    /// Logging setup failed.
    Logging(std::io::Error),
    /// Simulation could not start or run.
    Simulation(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "configuration error: {}", msg),
            CliError::Logging(err) => write!(f, "logging setup failed: {}", err),
            CliError::Simulation(msg) => write!(f, "simulation failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Logging(err)
    }
}
