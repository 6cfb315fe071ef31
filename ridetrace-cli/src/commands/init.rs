//! Init command - initialize configuration file.

use ridetrace::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run() -> Result<(), CliError> {
    // Keep existing settings; only write defaults for what is missing
    let config = ConfigFile::load().unwrap_or_default();
    config.save()?;

    println!("Configuration file: {}", config_file_path().display());
    println!();
    println!("Edit this file to customize RideTrace settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
