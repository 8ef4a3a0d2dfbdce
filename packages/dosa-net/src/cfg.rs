//! Scan-and-configure flow for remote devices.
//!
//! Discovery is a PING broadcast collected for a window and retried;
//! settings ride the `cfg` opcode with a solicited ACK as confirmation.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::Instant;

use dosa_wire::device::{DeviceState, DeviceType};
use dosa_wire::level::{LockState, LogLevel};
use dosa_wire::settings::{self, DoorCalibration, IrCalibration, SonarCalibration};
use dosa_wire::transport::ACK_DEADLINE;
use dosa_wire::{Comms, Opcode, WireError};

pub const SCAN_RETRIES: usize = 2;
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(1);
const DEBUG_DUMP_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ScannedDevice {
    pub addr: SocketAddr,
    pub device_name: String,
    pub device_type: DeviceType,
    pub device_state: DeviceState,
}

/// Broadcast PINGs and collect PONGs, de-duplicated by source IP.
pub async fn scan(comms: &mut Comms) -> Result<Vec<ScannedDevice>, WireError> {
    let mut devices: Vec<ScannedDevice> = Vec::new();

    for _ in 0..SCAN_RETRIES {
        let ping = comms.build(Opcode::Ping, &[])?;
        comms.send(&ping, None).await?;

        let deadline = Instant::now() + SCAN_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(msg) = comms.receive(Some(remaining)).await else {
                break;
            };
            if msg.opcode != Opcode::Pong {
                continue;
            }
            if devices.iter().any(|d| d.addr.ip() == msg.addr.ip()) {
                continue;
            }

            let payload = msg.payload();
            let device = ScannedDevice {
                addr: msg.addr,
                device_name: msg.device_name.clone(),
                device_type: DeviceType::from_wire(payload.first().copied().unwrap_or(0)),
                device_state: DeviceState::from_wire(payload.get(1).copied().unwrap_or(0)),
            };
            println!(
                "[{}]: {} ({}) {}/{}",
                devices.len(),
                device.device_name,
                device.addr.ip(),
                device.device_type,
                device.device_state
            );
            devices.push(device);
        }
    }

    Ok(devices)
}

/// Push one setting payload to a device, confirmed by ACK.
pub async fn apply_setting(
    comms: &mut Comms,
    device: SocketAddr,
    payload: &[u8],
) -> Result<bool, WireError> {
    let frame = comms.build(Opcode::ConfigSetting, payload)?;
    comms.send_with_ack(&frame, device, ACK_DEADLINE).await
}

/// Order a device into Bluetooth configuration mode.
pub async fn request_bt_mode(comms: &mut Comms, device: SocketAddr) -> Result<bool, WireError> {
    let frame = comms.build(Opcode::BtConfig, &[])?;
    comms.send_with_ack(&frame, device, ACK_DEADLINE).await
}

/// Ask for a debug dump and render the log frames that come back.
pub async fn request_debug_dump(comms: &mut Comms, device: SocketAddr) -> Result<(), WireError> {
    let frame = comms.build(Opcode::Debug, &[])?;
    comms.send(&frame, Some(device)).await?;

    let deadline = Instant::now() + DEBUG_DUMP_WINDOW;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Some(msg) = comms.receive(Some(remaining)).await else {
            break;
        };
        if msg.opcode != Opcode::Log || msg.addr.ip() != device.ip() {
            continue;
        }
        let payload = msg.sized_payload();
        let Some(&level) = payload.first() else {
            continue;
        };
        let label = LogLevel::from_wire(level).map_or("?", LogLevel::as_str);
        println!("[{label}] {}", String::from_utf8_lossy(&payload[1..]));
    }
    Ok(())
}

type StdinLines = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut StdinLines, text: &str) -> anyhow::Result<String> {
    println!("{text}");
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("stdin closed"))?;
    Ok(line.trim().to_string())
}

async fn prompt_parse<T: std::str::FromStr>(
    lines: &mut StdinLines,
    text: &str,
) -> anyhow::Result<T> {
    let raw = prompt(lines, text).await?;
    raw.parse().map_err(|_| anyhow!("invalid value: {raw}"))
}

async fn confirm(comms: &mut Comms, device: SocketAddr, payload: &[u8]) -> anyhow::Result<()> {
    if apply_setting(comms, device, payload).await? {
        println!("Setting applied");
    } else {
        println!(" -- no acknowledgement -- ");
    }
    Ok(())
}

/// Interactive configure mode: scan, pick a device, drive the settings menu.
pub async fn run(comms: &mut Comms, target: Option<std::net::IpAddr>) -> anyhow::Result<()> {
    println!("Scanning for devices..");
    let devices = scan(comms).await?;
    if devices.is_empty() {
        println!("No devices detected");
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let device = match target {
        Some(ip) => devices
            .iter()
            .find(|d| d.addr.ip() == ip)
            .ok_or_else(|| anyhow!("no device at {ip}"))?
            .clone(),
        None => {
            let index: usize = prompt_parse(&mut lines, "Select device:").await?;
            devices
                .get(index)
                .ok_or_else(|| anyhow!("no such device"))?
                .clone()
        }
    };
    println!("Configuring {} ({})", device.device_name, device.addr);

    loop {
        println!("Select option:");
        println!("[0] Order device into Bluetooth configuration mode");
        println!("[1] Set device name");
        println!("[2] Set wifi configuration");
        println!("[3] Set IR calibration");
        println!("[4] Set door calibration");
        println!("[5] Set sonar calibration");
        println!("[6] Set device password");
        println!("[7] Set lock state");
        println!("[8] Request debug dump");
        println!("[q] Quit");

        match prompt(&mut lines, "").await?.as_str() {
            "0" => {
                if request_bt_mode(comms, device.addr).await? {
                    println!("Device is entering Bluetooth configuration mode");
                } else {
                    println!(" -- no acknowledgement -- ");
                }
            }
            "1" => {
                let name = prompt(&mut lines, "New device name (2-20 chars):").await?;
                let payload = settings::device_name_payload(&name)?;
                confirm(comms, device.addr, &payload).await?;
            }
            "2" => {
                let ssid = prompt(&mut lines, "SSID (blank to clear):").await?;
                let password = if ssid.is_empty() {
                    String::new()
                } else {
                    prompt(&mut lines, "Password:").await?
                };
                confirm(comms, device.addr, &settings::wifi_payload(&ssid, &password)).await?;
            }
            "3" => {
                let cal = IrCalibration {
                    min_pixels: prompt_parse(&mut lines, "Min pixels:").await?,
                    single_delta: prompt_parse(&mut lines, "Single-pixel delta:").await?,
                    total_delta: prompt_parse(&mut lines, "Total delta:").await?,
                };
                confirm(comms, device.addr, &settings::ir_calibration_payload(cal)).await?;
            }
            "4" => {
                let cal = DoorCalibration {
                    open_distance_mm: prompt_parse(&mut lines, "Open distance (mm):").await?,
                    open_wait_ms: prompt_parse(&mut lines, "Open wait (ms):").await?,
                    cooldown_ms: prompt_parse(&mut lines, "Cooldown (ms):").await?,
                    close_ticks: prompt_parse(&mut lines, "Close ticks:").await?,
                };
                confirm(comms, device.addr, &settings::door_calibration_payload(cal)).await?;
            }
            "5" => {
                let cal = SonarCalibration {
                    trigger_threshold: prompt_parse(&mut lines, "Trigger threshold:").await?,
                    fixed_calibration: prompt_parse(&mut lines, "Fixed calibration:").await?,
                    trigger_coefficient: prompt_parse(&mut lines, "Trigger coefficient:").await?,
                };
                confirm(comms, device.addr, &settings::sonar_calibration_payload(cal)).await?;
            }
            "6" => {
                let password = prompt(&mut lines, "New password (4-50 chars):").await?;
                let payload = settings::password_payload(&password)?;
                confirm(comms, device.addr, &payload).await?;
            }
            "7" => {
                let value: u8 = prompt_parse(
                    &mut lines,
                    "Lock state (0 unlocked, 1 locked, 2 alarm, 3 breach):",
                )
                .await?;
                let Some(state) = LockState::from_wire(value) else {
                    println!("Bad lock state");
                    continue;
                };
                confirm(comms, device.addr, &settings::lock_payload(state)).await?;
            }
            "8" => request_debug_dump(comms, device.addr).await?,
            "q" | "" => {
                println!("Exiting");
                return Ok(());
            }
            other => bail!("unknown option: {other}"),
        }
    }
}
