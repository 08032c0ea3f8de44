//! plugwatchd - The plugwatch background service
//!
//! This is the main entry point for the plugwatchd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization (SQLite, with per-call timeouts)
//! - The reconciler scheduler loop
//! - Operator actions exposed as subcommands

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use plugwatch_api::{ControlState, EnergyLimit, NO_LIMIT};
use plugwatch_config::{load_config_or_default, Settings};
use plugwatch_core::{monthly_energy_wh, Operator, SchedulerLoop};
use plugwatch_store::{SqliteStore, StoreSnapshot, TelemetryStore, TimedStore};
use plugwatch_util::{default_config_path, DeviceKey, DATABASE_FILENAME};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Store = TimedStore<SqliteStore>;

/// plugwatchd - Policy reconciliation service for networked outlets
#[derive(Parser, Debug)]
#[command(name = "plugwatchd")]
#[command(about = "Policy reconciliation service for networked outlets", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/plugwatch/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set PLUGWATCH_DATA_DIR env var)
    #[arg(short, long, env = "PLUGWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (defaults to the config file's, then "info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Name recorded in the activity log for manual actions
    #[arg(long, default_value = "plugwatchd")]
    actor: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconciler until SIGINT/SIGTERM (default)
    Run,

    /// Load a JSON device/group snapshot into the store
    Import { file: PathBuf },

    /// Turn a device on or off by hand
    Toggle { device: String, state: Switch },

    /// Confirm a manual override and turn the device on
    Bypass { device: String },

    /// Return a device to automatic control
    Release { device: String },

    /// Remove a device's schedule
    RemoveSchedule { device: String },

    /// Set a device's monthly limit in kWh, or "No Limit"
    SetLimit { device: String, limit: String },

    /// Print the device table
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for ControlState {
    fn from(s: Switch) -> Self {
        match s {
            Switch::On => ControlState::On,
            Switch::Off => ControlState::Off,
        }
    }
}

fn parse_limit(s: &str) -> Result<EnergyLimit> {
    if s.trim().eq_ignore_ascii_case(NO_LIMIT) {
        return Ok(EnergyLimit::Unbounded);
    }
    let value: f64 = s
        .trim()
        .parse()
        .with_context(|| format!("Invalid limit {:?}", s))?;
    if !value.is_finite() || value < 0.0 {
        bail!("Limit must be a non-negative number or {:?}", NO_LIMIT);
    }
    Ok(EnergyLimit::Bounded(value))
}

fn open_store(args: &Args, settings: &Settings) -> Result<Arc<Store>> {
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| settings.daemon.data_dir.clone());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join(DATABASE_FILENAME);
    let sqlite = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;

    info!(db_path = %db_path.display(), "Store initialized");

    Ok(Arc::new(TimedStore::new(
        sqlite,
        settings.reconciler.store_timeout,
    )))
}

async fn run(store: Arc<Store>, settings: &Settings) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = SchedulerLoop::new(&settings.reconciler, store);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Set up signal handlers
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    info!("Service running");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
    }

    let _ = shutdown_tx.send(true);
    match handle.await {
        Ok(ticks) => info!(ticks, "Shutdown complete"),
        Err(e) => warn!(error = %e, "Scheduler task ended abnormally"),
    }
    Ok(())
}

async fn status(store: &Store) -> Result<()> {
    let now = plugwatch_util::now();
    let devices = store.read_all_devices().await?;

    println!(
        "{:<24} {:<14} {:<5} {:<5} {:<7} {:>12} {:>10}",
        "DEVICE", "DEPARTMENT", "CTRL", "MAIN", "STATUS", "MONTH (Wh)", "LIMIT"
    );
    for device in devices.values() {
        println!(
            "{:<24} {:<14} {:<5} {:<5} {:<7} {:>12.1} {:>10}",
            device.display_name(),
            device.department,
            device.control_state.to_string(),
            device.main_status.to_string(),
            device.root_status.to_string(),
            monthly_energy_wh(device, &now),
            device.power_limit.to_string(),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| settings.daemon.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config.display(),
        mock_time = plugwatch_util::is_mock_time_active(),
        "plugwatchd starting"
    );

    let store = open_store(&args, &settings)?;
    let operator = Operator::new(store.clone());
    let now = plugwatch_util::now();
    let key = |name: &str| DeviceKey::from_display_name(name);

    match &args.command {
        None | Some(Command::Run) => run(store, &settings).await?,
        Some(Command::Import { file }) => {
            let json = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read snapshot {:?}", file))?;
            let (devices, groups) = StoreSnapshot::from_json(&json)?
                .import_into(store.as_ref())
                .await?;
            println!("Imported {} devices and {} groups", devices, groups);
        }
        Some(Command::Toggle { device, state }) => {
            operator
                .set_control(&key(device), (*state).into(), &args.actor, now)
                .await?;
        }
        Some(Command::Bypass { device }) => {
            operator.confirm_bypass(&key(device), &args.actor, now).await?;
        }
        Some(Command::Release { device }) => {
            operator.release_bypass(&key(device), &args.actor, now).await?;
        }
        Some(Command::RemoveSchedule { device }) => {
            operator
                .remove_schedule(&key(device), &args.actor, now)
                .await?;
        }
        Some(Command::SetLimit { device, limit }) => {
            operator
                .set_power_limit(&key(device), parse_limit(limit)?, &args.actor, now)
                .await?;
        }
        Some(Command::Status) => status(&store).await?,
    }

    Ok(())
}
