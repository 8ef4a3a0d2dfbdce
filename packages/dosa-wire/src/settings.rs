//! Payload builders for the `cfg` remote-setting protocol.
//!
//! A setting payload is a single kind byte followed by the kind-specific
//! value bytes, all numbers little-endian. Senders should confirm delivery
//! with a solicited ACK.

use crate::error::WireError;
use crate::level::LockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Password,
    DeviceName,
    Wifi,
    IrCalibration,
    DoorCalibration,
    SonarCalibration,
    Lock,
}

impl SettingKind {
    pub fn as_wire(self) -> u8 {
        match self {
            SettingKind::Password => 0,
            SettingKind::DeviceName => 1,
            SettingKind::Wifi => 2,
            SettingKind::IrCalibration => 3,
            SettingKind::DoorCalibration => 4,
            SettingKind::SonarCalibration => 5,
            SettingKind::Lock => 6,
        }
    }
}

fn with_kind(kind: SettingKind, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + value.len());
    out.push(kind.as_wire());
    out.extend_from_slice(value);
    out
}

/// Device password, 4–50 characters.
pub fn password_payload(password: &str) -> Result<Vec<u8>, WireError> {
    if password.len() < 4 || password.len() > 50 {
        return Err(WireError::InvalidSetting("password must be 4-50 characters"));
    }
    Ok(with_kind(SettingKind::Password, password.as_bytes()))
}

/// Device name, 2–20 characters.
pub fn device_name_payload(name: &str) -> Result<Vec<u8>, WireError> {
    if name.len() < 2 || name.len() > 20 {
        return Err(WireError::InvalidSetting("device name must be 2-20 characters"));
    }
    Ok(with_kind(SettingKind::DeviceName, name.as_bytes()))
}

/// Wifi credentials as `ssid\npassword`; both empty clears the stored config.
pub fn wifi_payload(ssid: &str, password: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(ssid.len() + 1 + password.len());
    value.extend_from_slice(ssid.as_bytes());
    value.push(b'\n');
    value.extend_from_slice(password.as_bytes());
    with_kind(SettingKind::Wifi, &value)
}

#[derive(Debug, Clone, Copy)]
pub struct IrCalibration {
    pub min_pixels: u8,
    pub single_delta: f32,
    pub total_delta: f32,
}

pub fn ir_calibration_payload(cal: IrCalibration) -> Vec<u8> {
    let mut value = Vec::with_capacity(9);
    value.push(cal.min_pixels);
    value.extend_from_slice(&cal.single_delta.to_le_bytes());
    value.extend_from_slice(&cal.total_delta.to_le_bytes());
    with_kind(SettingKind::IrCalibration, &value)
}

#[derive(Debug, Clone, Copy)]
pub struct DoorCalibration {
    pub open_distance_mm: u16,
    pub open_wait_ms: u32,
    pub cooldown_ms: u32,
    pub close_ticks: u32,
}

pub fn door_calibration_payload(cal: DoorCalibration) -> Vec<u8> {
    let mut value = Vec::with_capacity(14);
    value.extend_from_slice(&cal.open_distance_mm.to_le_bytes());
    value.extend_from_slice(&cal.open_wait_ms.to_le_bytes());
    value.extend_from_slice(&cal.cooldown_ms.to_le_bytes());
    value.extend_from_slice(&cal.close_ticks.to_le_bytes());
    with_kind(SettingKind::DoorCalibration, &value)
}

#[derive(Debug, Clone, Copy)]
pub struct SonarCalibration {
    pub trigger_threshold: u16,
    pub fixed_calibration: u16,
    pub trigger_coefficient: f32,
}

pub fn sonar_calibration_payload(cal: SonarCalibration) -> Vec<u8> {
    let mut value = Vec::with_capacity(8);
    value.extend_from_slice(&cal.trigger_threshold.to_le_bytes());
    value.extend_from_slice(&cal.fixed_calibration.to_le_bytes());
    value.extend_from_slice(&cal.trigger_coefficient.to_le_bytes());
    with_kind(SettingKind::SonarCalibration, &value)
}

pub fn lock_payload(state: LockState) -> Vec<u8> {
    with_kind(SettingKind::Lock, &[state.as_wire()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_bounds_are_enforced() {
        assert!(password_payload("abc").is_err());
        assert!(password_payload(&"x".repeat(51)).is_err());
        let payload = password_payload("hunter12").unwrap();
        assert_eq!(payload[0], 0);
        assert_eq!(&payload[1..], b"hunter12");
    }

    #[test]
    fn device_name_bounds_are_enforced() {
        assert!(device_name_payload("x").is_err());
        assert!(device_name_payload(&"x".repeat(21)).is_err());
        let payload = device_name_payload("front door").unwrap();
        assert_eq!(payload[0], 1);
    }

    #[test]
    fn wifi_joins_with_newline_and_empty_clears() {
        let payload = wifi_payload("barn", "secret");
        assert_eq!(payload[0], 2);
        assert_eq!(&payload[1..], b"barn\nsecret");
        assert_eq!(wifi_payload("", ""), vec![2, b'\n']);
    }

    #[test]
    fn door_calibration_layout() {
        let payload = door_calibration_payload(DoorCalibration {
            open_distance_mm: 500,
            open_wait_ms: 3000,
            cooldown_ms: 10_000,
            close_ticks: 12,
        });
        assert_eq!(payload.len(), 15);
        assert_eq!(payload[0], 4);
        assert_eq!(u16::from_le_bytes([payload[1], payload[2]]), 500);
        assert_eq!(
            u32::from_le_bytes([payload[3], payload[4], payload[5], payload[6]]),
            3000
        );
        assert_eq!(
            u32::from_le_bytes([payload[11], payload[12], payload[13], payload[14]]),
            12
        );
    }

    #[test]
    fn sonar_calibration_layout() {
        let payload = sonar_calibration_payload(SonarCalibration {
            trigger_threshold: 120,
            fixed_calibration: 0,
            trigger_coefficient: 1.5,
        });
        assert_eq!(payload.len(), 9);
        assert_eq!(payload[0], 5);
        assert_eq!(
            f32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]),
            1.5
        );
    }

    #[test]
    fn ir_calibration_layout() {
        let payload = ir_calibration_payload(IrCalibration {
            min_pixels: 3,
            single_delta: 8.0,
            total_delta: 40.0,
        });
        assert_eq!(payload.len(), 10);
        assert_eq!(payload[0], 3);
        assert_eq!(payload[1], 3);
    }
}
