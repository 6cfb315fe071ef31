//! RideTrace CLI - Command-line interface
//!
//! This binary provides a command-line interface to the RideTrace library:
//! configuration management and a simulated ride for exercising the
//! tracking loop end to end.

mod commands;
mod error;
mod runner;
mod sim;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(
    name = "ridetrace",
    version,
    about = "Per-ride GPS location streaming for chauffeur fleet backends"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the configuration file
    Init,

    /// View and modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run a simulated ride against a stub backend
    Simulate(SimulateArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init => commands::init::run(),
        Command::Config { command } => commands::config::run(command),
        Command::Simulate(args) => commands::simulate::run(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
