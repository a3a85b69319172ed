//! swfand
//!
//! Thermal management daemon for network switch chassis. Reads the chassis
//! temperature sensors, drives the fan arrays through a per-board thermal
//! controller, watches fan health and powers the chassis down when it can no
//! longer be kept cool.
//!
//! The board is taken from `--board`, the `[board]` configuration section or
//! the EEPROM location file, in that order. `--mock` runs the same loop
//! against a simulated chassis.

mod config;
mod control;
mod resolver;
mod shutdown;
mod signals;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use config::RuntimeConfig;
use control::ControlLoop;
use signals::{SignalListener, StopSignal};
use std::path::PathBuf;
use swfan_core::config::{resolve_config_path, CONFIG_ENV_VAR};
use swfan_core::shutdown::ShutdownReason;
use swfan_core::{BoardKind, Tuning, TuningOverrides};
use swfan_hardware::{
    DeviceAccess, LinuxWatchdog, NullWatchdog, SimulatedChassis, SysfsDevice, SysfsLayout,
    Watchdog,
};
use tracing::{info, warn};

/// swfan fan control daemon
#[derive(Parser, Debug)]
#[command(name = "swfand")]
#[command(version, about = "Switch chassis fan control daemon", long_about = None)]
#[command(disable_help_flag = true)]
struct Args {
    /// Fan percent at LOW
    #[arg(short = 'l', long = "low")]
    low: Option<u32>,

    /// Fan percent at MEDIUM
    #[arg(short = 'm', long = "medium")]
    medium: Option<u32>,

    /// Fan percent at HIGH
    #[arg(short = 'h', long = "high")]
    high: Option<u32>,

    /// Temperature (degrees) at which LOW rises to MEDIUM
    #[arg(short = 'b', long = "bottom")]
    bottom: Option<i32>,

    /// Temperature (degrees) at which MEDIUM rises to HIGH
    #[arg(short = 't', long = "top")]
    top: Option<i32>,

    /// Iterations between temperature reports
    #[arg(short = 'r', long = "report")]
    report: Option<u32>,

    /// Base temperature (degrees) of the high-temperature profile; disables
    /// the upper fan tray
    #[arg(short = 'd', long = "base-temp")]
    base_temp: Option<i32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Board type, skipping detection
    #[arg(long)]
    board: Option<BoardKind>,

    /// Run against a simulated chassis
    #[arg(long)]
    mock: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    fn overrides(&self) -> TuningOverrides {
        TuningOverrides {
            low: self.low,
            medium: self.medium,
            high: self.high,
            temp_bottom: self.bottom,
            temp_top: self.top,
            report_interval: self.report,
            base_temperature: self.base_temp,
        }
    }
}

/// How the control loop ended
enum Outcome {
    Shutdown(ShutdownReason),
    Signal(StopSignal),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            eprint!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(args.verbose);

    info!("swfand starting...");

    // Determine config path: CLI flag > env var > default
    let config_path = resolve_config_path(args.config.clone(), std::env::var(CONFIG_ENV_VAR).ok());
    info!("Configuration file: {}", config_path.display());

    let runtime_config = RuntimeConfig::load(&config_path).await?;
    if runtime_config.from_file() {
        info!("Configuration loaded successfully");
    }
    let static_config = runtime_config.into_static_config();

    let kind = resolver::resolve_board(args.board, &static_config.board).await;
    if !kind.is_supported() {
        info!("{} does not need fan control, exiting", kind);
        return Ok(());
    }
    let variant = kind.variant()?;

    let (tuning, warnings) = Tuning::resolve(&variant, &static_config, &args.overrides());
    for warning in &warnings {
        warn!("{}", warning);
    }
    info!(
        "Levels {}/{}/{}/{}, temperatures {}..{}, report every {} iterations",
        tuning.levels.low,
        tuning.levels.medium,
        tuning.levels.high,
        tuning.levels.max,
        tuning.temp_bottom,
        tuning.temp_top,
        tuning.report_interval
    );

    let device: Box<dyn DeviceAccess> = if args.mock {
        info!("Mock mode: using a simulated chassis");
        Box::new(SimulatedChassis::new(&variant))
    } else {
        let layout = SysfsLayout::for_board(kind).with_overrides(&static_config.channels)?;
        Box::new(SysfsDevice::new(layout))
    };

    let watchdog: Box<dyn Watchdog> = if args.mock || !static_config.watchdog.enabled {
        info!("Watchdog disabled");
        Box::new(NullWatchdog::new())
    } else {
        Box::new(LinuxWatchdog::new(&static_config.watchdog.device))
    };

    let mut signals = SignalListener::install()?;
    let mut control = ControlLoop::new(variant, tuning, static_config, device, watchdog);

    let outcome = tokio::select! {
        reason = async {
            control.startup().await;
            control.run_until_shutdown().await
        } => Outcome::Shutdown(reason),
        signal = signals.recv() => Outcome::Signal(signal),
    };

    let code = match outcome {
        Outcome::Shutdown(reason) => control.shutdown(reason).await,
        Outcome::Signal(signal) => control.handle_signal(signal).await,
    };
    std::process::exit(code);
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
