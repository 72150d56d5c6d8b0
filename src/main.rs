use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use color_eyre::{eyre::eyre, Result};
use padpilot::config::Settings;
use padpilot::controller::{
    clear_active, register_active, trigger_active_shutdown, ControllerSupervisor, DeviceLocator,
    EvdevOpener, GilrsProvider, WorkerOutcome,
};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Reads a pad's buttons and sticks and prints a normalized control signal.
#[derive(Parser, Debug)]
#[command(name = "padpilot", version, about)]
struct Cli {
    /// Raw event device for buttons (default: /dev/input/event3)
    device: Option<PathBuf>,

    /// Settings file (default: <config dir>/padpilot/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only locate the event device, report it and exit
    #[arg(long)]
    probe: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Do not print throttle/steering lines
    #[arg(long)]
    quiet_axes: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let settings = Settings::load(cli.config.as_deref()).await?;
    let device_path = cli
        .device
        .clone()
        .unwrap_or_else(|| settings.device.path.clone());

    info!("Device path: {}", device_path.display());

    if cli.probe {
        return probe(&settings, device_path);
    }

    let supervisor = Arc::new(ControllerSupervisor::new(
        settings.clone(),
        Arc::new(EvdevOpener),
        Box::new(GilrsProvider::new()),
    ));
    register_active(supervisor.trigger())?;
    spawn_signal_listener();

    if let Err(e) = supervisor.initialize(Some(&device_path)) {
        clear_active();
        return Err(eyre!("Failed to initialize controller: {}", e));
    }

    spawn_telemetry(&supervisor, &settings, cli.quiet_axes);

    if let Some(secs) = cli.duration_secs {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("Run duration of {}s reached", secs);
            trigger_active_shutdown();
        });
    }

    let report = supervisor.run().await;
    clear_active();
    let report = report.map_err(|e| eyre!("Controller run failed: {}", e))?;

    if report.has_detached() {
        // A detached blocking reader would keep the runtime from shutting down
        warn!("Worker left detached, exiting immediately");
        std::process::exit(if report.is_clean() { 0 } else { 1 });
    }

    match &report.button_reader {
        WorkerOutcome::Failed(reason) | WorkerOutcome::Panicked(reason) => {
            return Err(eyre!("Button reader stopped: {}", reason));
        }
        _ => {}
    }
    if let WorkerOutcome::Panicked(reason) = &report.axis_poller {
        return Err(eyre!("Axis poller stopped: {}", reason));
    }

    info!("Program terminated successfully");
    Ok(())
}

fn setup(verbose: u8) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
    Ok(())
}

fn probe(settings: &Settings, device_path: PathBuf) -> Result<()> {
    let locator = DeviceLocator::new(
        Arc::new(EvdevOpener),
        settings.device.fallback_paths.clone(),
        false,
    );
    let device = locator
        .locate(&device_path)
        .map_err(|e| eyre!("Probe failed: {}", e))?;

    println!(
        "Successfully opened {} ({})",
        device.path.display(),
        device.source.name().unwrap_or("unnamed")
    );
    Ok(())
}

fn spawn_signal_listener() {
    tokio::spawn(async {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for SIGINT: {}", e);
                    return;
                }
                info!("Received SIGINT, shutting down...");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
        trigger_active_shutdown();
    });
}

// Consumer side: drain button events, poll the control signal
fn spawn_telemetry(supervisor: &Arc<ControllerSupervisor>, settings: &Settings, quiet_axes: bool) {
    if let Some(mut events) = supervisor.take_button_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                println!("[BUTTON] {} {}", event.button.label(), event.edge.label());
            }
        });
    }

    if quiet_axes {
        return;
    }

    let supervisor = supervisor.clone();
    let period = Duration::from_millis(settings.axis.poll_interval_ms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if !supervisor.is_running() {
                break;
            }
            let signal = supervisor.control_signal();
            println!(
                "[JOYSTICK] Throttle: {:.2} | Steering: {:.2}",
                signal.throttle, signal.steering
            );
        }
    });
}
