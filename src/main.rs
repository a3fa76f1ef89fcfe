// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::brightness::BacklightLevelEvaluator;
use crate::config::{Config, ConfigStore, ConfigWatcher};
use crate::daemon::ControlLoop;
use crate::hotplug::UdevHidWatcherFactory;
use crate::sensor::{AmbientLightSampler, LightSensor};

#[macro_use]
extern crate tracing;

mod brightness;
mod config;
mod daemon;
mod error;
mod hotplug;
mod keyboard;
mod protocols;
mod sensor;
mod wake;

/// Drive a QMK keyboard's backlight from the ambient light sensor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the daemon (default)
    Run,
    /// List HID interfaces, marking the configured keyboard
    ListDevices,
    /// Print the effective configuration
    PrintConfig,
    /// Take one sensor reading and show the level it maps to
    ReadSensor,
}

fn setup_logs() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,{}=info",
        env!("CARGO_CRATE_NAME")
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

fn main() -> Result<()> {
    setup_logs();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run(path))
        }
        Command::ListDevices => list_devices(&path),
        Command::PrintConfig => print_config(&path),
        Command::ReadSensor => read_sensor(&path),
    }
}

async fn run(path: PathBuf) -> Result<()> {
    let store = Arc::new(ConfigStore::open(path));

    let _watcher = match ConfigWatcher::spawn(store.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Configuration changes will not be picked up: {}", e);
            None
        }
    };

    let snapshot = store.current();
    let sensor = sensor::open_sensor(&snapshot.config.sensor);
    let sampler = Arc::new(AmbientLightSampler::new(sensor, snapshot.config.sensor.frequency));

    ControlLoop::new(store.subscribe(), sampler, Arc::new(UdevHidWatcherFactory))
        .with_wake(wake::spawn_resume_watcher())
        .run(shutdown_signal())
        .await
}

/// Completes on SIGINT or SIGTERM
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => debug!("Received SIGINT"),
        _ = terminate.recv() => debug!("Received SIGTERM"),
    }
}

fn list_devices(path: &Path) -> Result<()> {
    let config = Config::load(path).context("Failed to load configuration")?;
    let identity = match config.keyboard.identity() {
        Ok(identity) => Some(identity),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    let api = hidapi::HidApi::new().context("Failed to initialize hidapi")?;
    for info in api.device_list() {
        let marker = if identity.is_some_and(|identity| identity.matches(info)) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:04x}:{:04x} usage page 0x{:04x} usage 0x{:02x} {} {} {}",
            marker,
            info.vendor_id(),
            info.product_id(),
            info.usage_page(),
            info.usage(),
            info.path().to_string_lossy(),
            info.manufacturer_string().unwrap_or(""),
            info.product_string().unwrap_or(""),
        );
    }

    Ok(())
}

fn print_config(path: &Path) -> Result<()> {
    let config = Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
    print!("{}", config.to_toml()?);
    Ok(())
}

fn read_sensor(path: &Path) -> Result<()> {
    let config = Config::load(path).context("Failed to load configuration")?;

    let Some(mut sensor) = sensor::open_sensor(&config.sensor) else {
        bail!("No ambient light sensor found");
    };
    let lux = sensor.read_lux().context("Failed to read ambient light")?;

    let evaluator = BacklightLevelEvaluator::with_darkness_floor(config.sensor.darkness_floor_lux);
    println!(
        "{}: {} lux -> backlight level {}",
        sensor.describe(),
        lux,
        evaluator.evaluate(lux, &config.adjustments)
    );
    Ok(())
}
