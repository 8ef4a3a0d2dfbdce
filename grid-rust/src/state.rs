//! Grid state and multi-source sensor fusion.
//!
//! Readings arrive from the BLE charge controller and, when fitted, a serial
//! battery shunt. Each field group remembers which source last wrote it; the
//! shunt is authoritative for the battery and load groups, so while it is
//! configured the BLE values for those groups are discarded.

use serde_json::{json, Value};

use dosa_wire::status::GridStatus;

use crate::ble::BleReading;
use crate::shunt::ShuntBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldSource {
    #[default]
    None,
    Ble,
    Shunt,
}

#[derive(Debug, Clone, Default)]
pub struct BatteryGroup {
    /// State of charge, percent.
    pub soc: f32,
    pub voltage: f32,
    pub temperature: f32,
    pub ah_remaining: f32,
    pub source: FieldSource,
}

#[derive(Debug, Clone, Default)]
pub struct PvGroup {
    pub power: f32,
    pub voltage: f32,
    /// Generation today, as reported by the controller.
    pub provided: f32,
}

#[derive(Debug, Clone, Default)]
pub struct LoadGroup {
    pub power: f32,
    pub current: f32,
    /// Discharge amp-hours today, scaled to watt-hours.
    pub consumed: f32,
    /// Time to go at present draw, minutes. Shunt only.
    pub time_to_go: Option<f32>,
    pub source: FieldSource,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerGroup {
    pub temperature: f32,
    pub load_state: bool,
    pub fan_speed: u8,
}

/// Nominal bus voltage used to convert between watts and amps when only one
/// is reported.
const NOMINAL_VOLTAGE: f32 = 12.5;

#[derive(Debug, Clone, Default)]
pub struct GridState {
    pub battery: BatteryGroup,
    pub pv: PvGroup,
    pub load: LoadGroup,
    pub controller: ControllerGroup,
}

impl GridState {
    /// Fold in a controller reading. Battery and load fall to the shunt when
    /// one is configured.
    pub fn apply_ble(&mut self, r: &BleReading, shunt_present: bool, bat_size: f32) {
        if !shunt_present {
            self.battery.soc = r.battery_percentage;
            self.battery.voltage = r.battery_voltage;
            self.battery.ah_remaining = bat_size * r.battery_percentage / 100.0;
            self.battery.source = FieldSource::Ble;

            self.load.power = r.load_power;
            self.load.current = r.load_power / NOMINAL_VOLTAGE;
            self.load.time_to_go = None;
            self.load.source = FieldSource::Ble;
        }
        self.battery.temperature = r.battery_temperature;
        self.load.consumed = r.discharging_amp_hours_today * NOMINAL_VOLTAGE;

        self.pv.power = r.pv_power;
        self.pv.voltage = r.pv_voltage;
        self.pv.provided = r.power_generation_today;

        self.controller.temperature = r.controller_temperature;
        self.controller.load_state = r.load_state;
    }

    /// Fold in a shunt batch; only the keys present in the batch move.
    pub fn apply_shunt(&mut self, batch: &ShuntBatch, bat_size: f32) {
        if let Some(v) = batch.voltage {
            self.battery.voltage = v;
        }
        if let Some(soc) = batch.soc {
            self.battery.soc = soc;
            self.battery.ah_remaining = bat_size * soc / 100.0;
        }
        if let Some(p) = batch.power {
            self.load.power = -p;
        }
        if let Some(i) = batch.current {
            self.load.current = -i;
        }
        if let Some(ttg) = batch.time_to_go {
            self.load.time_to_go = Some(ttg);
        }
        self.battery.source = FieldSource::Shunt;
        self.load.source = FieldSource::Shunt;
    }

    /// Wire snapshot for `sta` payloads.
    pub fn to_status(&self) -> GridStatus {
        GridStatus {
            battery_soc: self.battery.soc.clamp(0.0, 100.0).round() as u8,
            battery_voltage: self.battery.voltage,
            battery_temperature: self.battery.temperature.round() as i16,
            pv_power: self.pv.power.clamp(0.0, u16::MAX as f32) as u16,
            pv_voltage: self.pv.voltage,
            pv_provided: self.pv.provided.clamp(0.0, u16::MAX as f32) as u16,
            load_state: self.controller.load_state,
            load_power: self.load.power.clamp(0.0, u16::MAX as f32) as u16,
            load_consumed: self.load.consumed.clamp(0.0, u16::MAX as f32).round() as u16,
            controller_temperature: self.controller.temperature.round() as i16,
        }
    }

    /// Data-file document read by the touch UI. `mains` is None while the
    /// relay decision is still pending.
    pub fn data_file_json(&self, mains: Option<bool>, pv_size: f32, bat_size: f32) -> Value {
        let (load_power, load_current, ttg) = if self.load.source == FieldSource::Shunt {
            (
                self.load.power,
                self.load.current,
                self.load.time_to_go.map(Value::from).unwrap_or(Value::Null),
            )
        } else {
            // Pending a shunt, load is approximated from the PV/load delta.
            let delta = self.pv.power - self.load.power;
            (delta, delta / NOMINAL_VOLTAGE, Value::Null)
        };

        json!({
            "battery": {
                "capacity": bat_size,
                "soc": self.battery.soc,
                "voltage": (self.battery.voltage * 100.0).round() / 100.0,
                "ah_remaining": (self.battery.ah_remaining * 100.0).round() / 100.0,
            },
            "mains": {
                "active": mains,
            },
            "pv": {
                "capacity": pv_size,
                "power": self.pv.power,
                "voltage": self.pv.voltage,
            },
            "load": {
                "power": load_power,
                "current": load_current,
                "ttg": ttg,
            },
            "ctrl": {
                "temp": self.controller.temperature,
                "fan_speed": self.controller.fan_speed,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> BleReading {
        BleReading {
            battery_percentage: 80.0,
            battery_voltage: 12.0,
            battery_temperature: 20.0,
            controller_temperature: 35.0,
            pv_power: 400.0,
            pv_voltage: 18.0,
            load_power: 60.0,
            load_state: true,
            discharging_amp_hours_today: 10.0,
            power_generation_today: 31.0,
        }
    }

    #[test]
    fn shunt_overrides_ble_battery_and_load() {
        let mut state = GridState::default();

        state.apply_ble(&reading(), true, 500.0);
        // The BLE battery figures never landed.
        assert_eq!(state.battery.source, FieldSource::None);
        assert_eq!(state.battery.voltage, 0.0);
        // PV and controller groups still update.
        assert_eq!(state.pv.power, 400.0);
        assert_eq!(state.controller.temperature, 35.0);

        let mut batch = ShuntBatch::default();
        batch.absorb_line("V\t13000");
        state.apply_shunt(&batch, 500.0);

        assert_eq!(state.battery.voltage, 13.0);
        assert_eq!(state.battery.source, FieldSource::Shunt);
    }

    #[test]
    fn without_shunt_ble_owns_everything() {
        let mut state = GridState::default();
        state.apply_ble(&reading(), false, 500.0);

        assert_eq!(state.battery.source, FieldSource::Ble);
        assert_eq!(state.battery.voltage, 12.0);
        assert_eq!(state.battery.soc, 80.0);
        assert_eq!(state.battery.ah_remaining, 400.0);
        assert_eq!(state.load.power, 60.0);
    }

    #[test]
    fn shunt_discharge_signs_flip_for_the_load_view() {
        let mut state = GridState::default();
        let mut batch = ShuntBatch::default();
        batch.absorb_line("P\t-120");
        batch.absorb_line("I\t-9600");
        batch.absorb_line("TTG\t540");
        state.apply_shunt(&batch, 500.0);

        assert_eq!(state.load.power, 120.0);
        assert!((state.load.current - 9.6).abs() < 1e-5);
        assert_eq!(state.load.time_to_go, Some(540.0));
    }

    #[test]
    fn status_snapshot_rounds_and_clamps() {
        let mut state = GridState::default();
        state.apply_ble(&reading(), false, 500.0);
        let status = state.to_status();
        assert_eq!(status.battery_soc, 80);
        assert_eq!(status.pv_power, 400);
        assert_eq!(status.load_consumed, 125);
        assert!(status.load_state);
    }

    #[test]
    fn data_file_structure_is_stable() {
        let mut state = GridState::default();
        state.apply_ble(&reading(), false, 500.0);
        let doc = state.data_file_json(Some(false), 1000.0, 500.0);

        assert_eq!(doc["battery"]["capacity"], 500.0);
        assert_eq!(doc["mains"]["active"], false);
        assert_eq!(doc["pv"]["power"], 400.0);
        // No shunt: load is the PV/load delta placeholder and TTG is null.
        assert_eq!(doc["load"]["power"], 340.0);
        assert!(doc["load"]["ttg"].is_null());
        assert_eq!(doc["ctrl"]["temp"], 35.0);
    }

    #[test]
    fn undecided_mains_serialises_as_null() {
        let state = GridState::default();
        let doc = state.data_file_json(None, 1000.0, 500.0);
        assert!(doc["mains"]["active"].is_null());
    }
}
