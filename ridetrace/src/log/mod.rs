//! Logging setup for library consumers and the CLI.
//!
//! Builds a `tracing` subscriber with a console layer and, optionally, a
//! non-blocking daily-rolling file layer. The filter honors `RUST_LOG` and
//! falls back to `info`.
//!
//! # Example
//!
//! ```ignore
//! use ridetrace::log;
//!
//! // Console only
//! let _guard = log::init();
//!
//! // Console plus rolling file under the platform data directory
//! let _guard = log::init_with_file(&log::default_log_dir())?;
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// File name prefix for rolling log files.
const LOG_FILE_PREFIX: &str = "ridetrace.log";

/// Keeps the non-blocking file writer flushing.
///
/// Hold this for the lifetime of the program; dropping it flushes and stops
/// the background writer thread.
#[must_use = "dropping the guard stops log file writing"]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("ridetrace").join("logs"))
        .unwrap_or_else(|| PathBuf::from("ridetrace-logs"))
}

/// Install a console-only subscriber.
pub fn init() -> LogGuard {
    install(None)
}

/// Install a subscriber with a console layer and a daily-rolling file layer
/// under `dir`.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_with_file(dir: &Path) -> io::Result<LogGuard> {
    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(install(Some(appender)))
}

fn install(appender: Option<tracing_appender::rolling::RollingFileAppender>) -> LogGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);

    match appender {
        Some(appender) => {
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            // Already initialized means a subscriber is installed; keep it
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init();
            LogGuard {
                _file_guard: Some(file_guard),
            }
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init();
            LogGuard { _file_guard: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_default_log_dir_ends_in_logs() {
        let dir = default_log_dir();
        assert!(dir.to_string_lossy().ends_with("logs"));
    }

    #[test]
    fn test_init_with_file_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("logs");
        let _guard = init_with_file(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
