//! Simulate command - drive a tracked ride against a stub backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use ridetrace::config::TrackingConfig;
use ridetrace::geo::{haversine_distance_m, Coordinates};
use ridetrace::location::Geolocator;
use ridetrace::tracking::{TrackingEvent, TrackingSupervisor};
use ridetrace::transport::UpdateTransport;

use crate::error::CliError;
use crate::runner::CliRunner;
use crate::sim::{SimulatedGeolocator, SimulatedPermissionGate, SimulatedTransport};

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Ride identifier
    #[arg(long, default_value = "ride-sim-1")]
    pub ride_id: String,

    /// Starting latitude
    #[arg(long, default_value_t = 40.7580)]
    pub start_lat: f64,

    /// Starting longitude
    #[arg(long, default_value_t = -73.9855)]
    pub start_lon: f64,

    /// Destination latitude
    #[arg(long, default_value_t = 40.7128)]
    pub dest_lat: f64,

    /// Destination longitude
    #[arg(long, default_value_t = -74.0060)]
    pub dest_lon: f64,

    /// Driving speed in meters per second
    #[arg(long, default_value_t = 12.0)]
    pub speed: f64,

    /// GPS jitter radius in meters
    #[arg(long, default_value_t = 8.0)]
    pub jitter: f64,

    /// Probability in [0, 1] that a simulated send fails
    #[arg(long, default_value_t = 0.0)]
    pub fail_rate: f64,

    /// Stop automatically after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Start without location permission to show the denial path
    #[arg(long)]
    pub deny_permission: bool,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    if args.speed <= 0.0 {
        return Err(CliError::Simulation(
            "speed must be greater than zero".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&args.fail_rate) {
        return Err(CliError::Simulation(
            "fail-rate must be between 0 and 1".to_string(),
        ));
    }

    let runner = CliRunner::new()?;
    runner.log_startup("simulate");
    let config = runner.tracking_config();

    // Print banner
    println!("RideTrace Ride Simulation v{}", ridetrace::VERSION);
    println!("==============================");
    println!();
    println!("Ride:    {}", args.ride_id);
    println!("From:    {:.5}, {:.5}", args.start_lat, args.start_lon);
    println!("To:      {:.5}, {:.5}", args.dest_lat, args.dest_lon);
    println!("Speed:   {:.1} m/s", args.speed);
    println!(
        "Cadence: every {}s, every {}s within {:.0} m of the destination",
        config.default_interval.as_secs(),
        config.proximity_interval.as_secs(),
        config.proximity_threshold_m
    );
    if args.fail_rate > 0.0 {
        println!(
            "Backend: simulated, {:.0}% of sends fail",
            args.fail_rate * 100.0
        );
    } else {
        println!("Backend: simulated, always accepts");
    }
    println!();
    println!("Press Ctrl+C to stop tracking and exit");
    println!();

    run_simulation(config, args)
}

#[tokio::main]
async fn run_simulation(config: TrackingConfig, args: SimulateArgs) -> Result<(), CliError> {
    let start = Coordinates::new(args.start_lat, args.start_lon);
    let destination = Coordinates::new(args.dest_lat, args.dest_lon);

    let geolocator = Arc::new(SimulatedGeolocator::new(
        start,
        destination,
        args.speed,
        args.jitter,
    ));
    let transport = Arc::new(SimulatedTransport::new(args.fail_rate));
    let gate = if args.deny_permission {
        Arc::new(SimulatedPermissionGate::denied())
    } else {
        Arc::new(SimulatedPermissionGate::granted())
    };

    let supervisor = TrackingSupervisor::new(
        config,
        Arc::clone(&geolocator) as Arc<dyn Geolocator>,
        gate,
        Arc::clone(&transport) as Arc<dyn UpdateTransport>,
    );

    // Print the event stream until the supervisor goes away
    let mut events = supervisor.subscribe();
    let json = args.json;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Ctrl+C requests shutdown; an optional duration does the same
    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .map_err(|e| CliError::Simulation(format!("failed to set signal handler: {}", e)))?;

    let started_at = Instant::now();
    if !supervisor
        .start_tracking(&args.ride_id, Some(destination))
        .await
    {
        // Let the printer surface the refusal events before we bail
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(supervisor);
        let _ = printer.await;
        return Err(CliError::Simulation(
            "tracking did not start; check location permission".to_string(),
        ));
    }

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => shutdown.cancelled().await,
    }

    println!();
    println!("Stopping tracking...");
    supervisor.stop_all_tracking().await;

    // Dropping the supervisor closes the event channel and ends the printer
    drop(supervisor);
    let _ = printer.await;

    let position = geolocator.position().await;
    let remaining = haversine_distance_m(position, destination);

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Duration:          {}s", started_at.elapsed().as_secs());
    println!("  Updates delivered: {}", transport.delivered_count());
    println!("  Sends failed:      {}", transport.rejected_count());
    println!(
        "  Final position:    {:.5}, {:.5}",
        position.latitude, position.longitude
    );
    if remaining < 1.0 {
        println!("  Distance left:     arrived");
    } else {
        println!("  Distance left:     {:.0} m", remaining);
    }

    Ok(())
}

/// Print one tracking event, human-readable or as a JSON line.
fn print_event(event: &TrackingEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(err) => eprintln!("event serialization failed: {}", err),
        }
        return;
    }

    match event {
        TrackingEvent::StatusChanged {
            ride_id,
            old,
            new,
            message,
        } => match message {
            Some(msg) => println!("[{}] status: {} -> {} ({})", ride_id, old, new, msg),
            None => println!("[{}] status: {} -> {}", ride_id, old, new),
        },
        TrackingEvent::UpdateSent {
            ride_id,
            latitude,
            longitude,
            interval_secs,
            ..
        } => {
            println!(
                "[{}] update sent: {:.5}, {:.5} (next in {}s)",
                ride_id, latitude, longitude, interval_secs
            );
        }
        TrackingEvent::UpdateFailed {
            ride_id,
            message,
            will_retry,
            retry_count,
        } => {
            let suffix = if *will_retry { ", retrying" } else { "" };
            println!(
                "[{}] attempt {} failed: {}{}",
                ride_id, retry_count, message, suffix
            );
        }
    }
}
