mod ble;
mod config;
mod fan;
mod grid;
mod leds;
mod mains;
mod power;
mod shunt;
mod state;
mod watch;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use config::GridConfig;
use dosa_wire::Comms;
use fan::{FanController, FanParams};
use grid::{GridController, GridSetup};
use leds::{ConsoleStick, LedPanel, LedStick};
use shunt::ShuntReader;

const DEVICE_NAME: &str = "DOSA Grid";

#[derive(Parser, Debug)]
#[command(name = "dosa-grid", about = "DOSA Power Grid Controller")]
struct Args {
    /// Target Bluetooth MAC address of the BT-1 device
    #[arg(short, long)]
    mac: String,

    /// HCI adapter for BLE communications
    #[arg(short = 'i', long, default_value = "hci0")]
    hci: String,

    /// BLE polling interval in seconds
    #[arg(short, long, default_value_t = 30)]
    poll: u64,

    /// Serial TTY port for sending PWM requests
    #[arg(short = 's', long = "pwm")]
    pwm_port: Option<String>,

    /// Serial TTY port for reading from a Victron SmartShunt
    #[arg(short = 'v', long = "shunt")]
    shunt_port: Option<String>,

    /// Size of the PV grid in watts
    #[arg(short, long, default_value_t = 1000)]
    grid_size: u32,

    /// Size of the battery array in amp-hours
    #[arg(short, long, default_value_t = 500)]
    battery_size: u32,

    /// Enable the LED light stick
    #[arg(short, long)]
    lights: bool,

    /// Override the config file location
    #[arg(long)]
    config: Option<PathBuf>,
}

/// "hci0" → adapter index 0.
fn adapter_index(hci: &str) -> usize {
    hci.trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dosa_grid=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("-- DOSA Power Grid Controller --");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let comms = Comms::open(DEVICE_NAME).context("binding DOSA transport")?;

    let (ble_tx, ble_rx) = mpsc::channel(16);
    let ble_task = ble::spawn(
        args.mac.clone(),
        adapter_index(&args.hci),
        Duration::from_secs(args.poll),
        ble_tx,
    );

    let cfg_path = args.config.unwrap_or_else(power::config_file_path);
    let cfg = GridConfig::load(&cfg_path, None).await;

    let (watcher, watch_rx) = match watch::spawn(cfg_path.clone()) {
        Ok((w, rx)) => (Some(w), Some(rx)),
        Err(e) => {
            warn!("config watch unavailable: {e}");
            (None, None)
        }
    };

    let shunt = args.shunt_port.map(ShuntReader::new);
    if args.pwm_port.is_none() {
        info!("No PWM serial port configured");
    }
    let fan = FanController::new(args.pwm_port, FanParams::default());

    let leds = args.lights.then(|| {
        info!("Bringing lights online..");
        LedPanel::new(Box::new(ConsoleStick) as Box<dyn LedStick>)
    });

    let setup = GridSetup {
        cfg,
        cfg_path,
        data_path: power::data_file_path(),
        pv_size: args.grid_size as f32,
        bat_size: args.battery_size as f32,
    };
    let mut controller = GridController::new(comms, setup, ble_rx, shunt, watch_rx, fan, leds);

    tokio::select! {
        _ = controller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt, shutting down");
        }
    }

    // Best-effort teardown: the BLE session dies with its task.
    ble_task.abort();
    drop(watcher);
    Ok(())
}
