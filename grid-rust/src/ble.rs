//! BT-1 solar charge controller client.
//!
//! The BT-1 dongle exposes a modbus-style register protocol over two GATT
//! characteristics: write a read-request, receive register frames as
//! notifications. A supervisor task owns the session; when it dies for any
//! reason the session is respawned after a cool-off, and parsed readings
//! reach the control loop through a channel so this module knows nothing
//! about the downstream subsystems.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Manager, Peripheral};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffd1_0000_1000_8000_00805f9b34fb);

const DEVICE_ID: u8 = 255;
const READ_REGISTER: u16 = 256;
const READ_WORDS: u16 = 34;

/// Max wait for BLE scanning to surface the target device.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);
/// Cool-off before a dead session is respawned.
pub const RESPAWN_COOLOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BleError {
    #[error("no powered BLE adapter available")]
    NotPowered,

    #[error("BLE device not found")]
    DeviceNotFound,

    #[error("connection failed: {0}")]
    ConnectionFailed(btleplug::Error),

    #[error("unexpectedly disconnected from device")]
    Disconnected,

    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),
}

/// One decoded register read from the charge controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BleReading {
    pub battery_percentage: f32,
    pub battery_voltage: f32,
    pub battery_temperature: f32,
    pub controller_temperature: f32,
    pub pv_power: f32,
    pub pv_voltage: f32,
    pub load_power: f32,
    pub load_state: bool,
    pub discharging_amp_hours_today: f32,
    pub power_generation_today: f32,
}

fn be_u16(bs: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*bs.get(offset)?, *bs.get(offset + 1)?]))
}

/// Decode a charge-controller register frame (modbus function 3 response).
/// Register layout follows the BT-1 documentation; temperatures are single
/// unsigned bytes, voltages are tenths, currents hundredths.
pub fn parse_controller_frame(bs: &[u8]) -> Option<BleReading> {
    if bs.get(1) != Some(&3) {
        return None;
    }

    let load_byte = *bs.get(67)?;
    Some(BleReading {
        battery_percentage: be_u16(bs, 3)? as f32,
        battery_voltage: be_u16(bs, 5)? as f32 * 0.1,
        controller_temperature: *bs.get(9)? as f32,
        battery_temperature: *bs.get(10)? as f32,
        load_power: be_u16(bs, 15)? as f32,
        pv_voltage: be_u16(bs, 17)? as f32 * 0.1,
        pv_power: be_u16(bs, 21)? as f32,
        discharging_amp_hours_today: be_u16(bs, 39)? as f32,
        power_generation_today: be_u16(bs, 41)? as f32,
        load_state: load_byte & 0x80 == 0x80,
    })
}

pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Modbus read request, CRC low byte first.
pub fn read_request(device_id: u8, register: u16, words: u16) -> Vec<u8> {
    let mut data = vec![
        device_id,
        3,
        (register >> 8) as u8,
        register as u8,
        (words >> 8) as u8,
        words as u8,
    ];
    let crc = crc16_modbus(&data);
    data.push((crc & 0xFF) as u8);
    data.push((crc >> 8) as u8);
    data
}

/// Spawn the supervised BLE worker. Readings land on `tx`; the worker exits
/// only when the receiving side goes away.
pub fn spawn(
    mac: String,
    adapter_index: usize,
    poll_interval: Duration,
    tx: mpsc::Sender<BleReading>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_session(&mac, adapter_index, poll_interval, &tx).await {
                Ok(()) => {
                    info!("BT listener finished");
                    return;
                }
                Err(e) => error!("BT listener died: {e}"),
            }
            if tx.is_closed() {
                return;
            }
            warn!("respawning BT listener in {} seconds..", RESPAWN_COOLOFF.as_secs());
            tokio::time::sleep(RESPAWN_COOLOFF).await;
        }
    })
}

async fn discover(
    adapter: &btleplug::platform::Adapter,
    mac: &str,
) -> Result<Peripheral, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(DISCOVERY_TIMEOUT).await;
    let _ = adapter.stop_scan().await;

    for p in adapter.peripherals().await? {
        let address = p.address().to_string();
        debug!("found device: {address}");
        if address.eq_ignore_ascii_case(mac) {
            return Ok(p);
        }
    }
    Err(BleError::DeviceNotFound)
}

async fn run_session(
    mac: &str,
    adapter_index: usize,
    poll_interval: Duration,
    tx: &mpsc::Sender<BleReading>,
) -> Result<(), BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let adapter = adapters
        .into_iter()
        .nth(adapter_index)
        .ok_or(BleError::NotPowered)?;

    let peripheral = discover(&adapter, mac).await?;
    info!("connecting to {mac}..");
    peripheral
        .connect()
        .await
        .map_err(BleError::ConnectionFailed)?;
    peripheral.discover_services().await?;

    let chars = peripheral.characteristics();
    let notify_char = chars
        .iter()
        .find(|c| c.uuid == NOTIFY_CHAR_UUID)
        .cloned()
        .ok_or(BleError::Disconnected)?;
    let write_char = chars
        .iter()
        .find(|c| c.uuid == WRITE_CHAR_UUID)
        .cloned()
        .ok_or(BleError::Disconnected)?;

    peripheral.subscribe(&notify_char).await?;
    let mut notifications = peripheral.notifications().await?;

    let request = read_request(DEVICE_ID, READ_REGISTER, READ_WORDS);
    let mut poll = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                peripheral
                    .write(&write_char, &request, WriteType::WithResponse)
                    .await?;
            }
            item = notifications.next() => {
                let Some(data) = item else {
                    return Err(BleError::Disconnected);
                };
                if data.uuid != NOTIFY_CHAR_UUID {
                    continue;
                }
                match data.value.get(1).copied() {
                    Some(3) => {
                        if let Some(reading) = parse_controller_frame(&data.value) {
                            if tx.send(reading).await.is_err() {
                                // Control loop is gone; shut the session down.
                                let _ = peripheral.disconnect().await;
                                return Ok(());
                            }
                        }
                    }
                    Some(6) => debug!("received response for write operation"),
                    op => warn!("received response for unknown operation: {op:?}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_known_modbus_vector() {
        // 01 03 00 00 00 01 -> CRC bytes 84 0A on the wire.
        assert_eq!(crc16_modbus(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
    }

    #[test]
    fn read_request_layout() {
        let req = read_request(DEVICE_ID, READ_REGISTER, READ_WORDS);
        assert_eq!(&req[..6], &[255, 3, 1, 0, 0, 34]);
        let crc = crc16_modbus(&req[..6]);
        assert_eq!(req[6], (crc & 0xFF) as u8);
        assert_eq!(req[7], (crc >> 8) as u8);
    }

    #[test]
    fn controller_frame_parses_registers() {
        let mut frame = vec![0u8; 70];
        frame[1] = 3; // read response
        frame[3..5].copy_from_slice(&93u16.to_be_bytes()); // SOC
        frame[5..7].copy_from_slice(&132u16.to_be_bytes()); // 13.2 V
        frame[9] = 41; // controller temp
        frame[10] = 22; // battery temp
        frame[15..17].copy_from_slice(&85u16.to_be_bytes()); // load W
        frame[17..19].copy_from_slice(&184u16.to_be_bytes()); // 18.4 V PV
        frame[21..23].copy_from_slice(&240u16.to_be_bytes()); // PV W
        frame[39..41].copy_from_slice(&12u16.to_be_bytes()); // Ah discharged
        frame[41..43].copy_from_slice(&31u16.to_be_bytes()); // generation
        frame[67] = 0x80; // load on

        let reading = parse_controller_frame(&frame).unwrap();
        assert_eq!(reading.battery_percentage, 93.0);
        assert!((reading.battery_voltage - 13.2).abs() < 1e-5);
        assert_eq!(reading.controller_temperature, 41.0);
        assert_eq!(reading.load_power, 85.0);
        assert!((reading.pv_voltage - 18.4).abs() < 1e-5);
        assert_eq!(reading.pv_power, 240.0);
        assert!(reading.load_state);
    }

    #[test]
    fn high_temperature_bytes_stay_unsigned() {
        let mut frame = vec![0u8; 70];
        frame[1] = 3;
        frame[9] = 130;
        frame[10] = 200;

        let reading = parse_controller_frame(&frame).unwrap();
        assert_eq!(reading.controller_temperature, 130.0);
        assert_eq!(reading.battery_temperature, 200.0);
    }

    #[test]
    fn write_responses_are_not_readings() {
        let mut frame = vec![0u8; 70];
        frame[1] = 6;
        assert!(parse_controller_frame(&frame).is_none());
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let mut frame = vec![0u8; 40];
        frame[1] = 3;
        assert!(parse_controller_frame(&frame).is_none());
    }
}
