//! Threshold tables for the power-grid control loop and display banks.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// PV output bands as fractions of the array size.
pub struct PvThresholds {
    pub high: f32,
    pub med: f32,
    pub low: f32,
}

pub const PV: PvThresholds = PvThresholds {
    high: 0.75,
    med: 0.3,
    low: 0.05,
};

/// Battery SOC bands, percent.
pub struct BatteryThresholds {
    pub high: f32,
    pub med: f32,
    pub low: f32,
}

pub const BATTERY: BatteryThresholds = BatteryThresholds {
    high: 100.0,
    med: 66.0,
    low: 33.0,
};

/// Load wattage bands for the display.
pub const LOAD_WARN: f32 = 180.0;
pub const LOAD_BAD: f32 = 240.0;

/// Mains reaction aggressiveness, selected by the `mains_opt` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Eco,
    #[default]
    Std,
    Safe,
}

impl Sensitivity {
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(Sensitivity::Eco),
            1 => Some(Sensitivity::Std),
            2 => Some(Sensitivity::Safe),
            _ => None,
        }
    }
}

/// Automatic-mode parameters: SOC bounds and the dwell each proposal must
/// hold before the relay is switched.
#[derive(Debug, Clone, Copy)]
pub struct MainsParams {
    pub activate_soc: f32,
    pub activate_time: Duration,
    pub deactivate_soc: f32,
    pub deactivate_time: Duration,
}

pub fn mains_params(level: Sensitivity) -> MainsParams {
    match level {
        // Tolerates deep discharge before falling back to mains.
        Sensitivity::Eco => MainsParams {
            activate_soc: 50.0,
            activate_time: Duration::from_secs(60),
            deactivate_soc: 80.0,
            deactivate_time: Duration::from_secs(120),
        },
        Sensitivity::Std => MainsParams {
            activate_soc: 90.0,
            activate_time: Duration::from_secs(15),
            deactivate_soc: 100.0,
            deactivate_time: Duration::from_secs(60),
        },
        // Keeps the battery as full as possible.
        Sensitivity::Safe => MainsParams {
            activate_soc: 95.0,
            activate_time: Duration::from_secs(10),
            deactivate_soc: 100.0,
            deactivate_time: Duration::from_secs(30),
        },
    }
}

const PROD_CONFIG_FILE: &str = "/etc/power_grid_cfg.json";
const PROD_DATA_FILE: &str = "/usr/share/power_grid.json";

/// A machine is "production" when the provisioned config file is present.
pub fn is_production_machine() -> bool {
    Path::new(PROD_CONFIG_FILE).exists()
}

pub fn config_file_path() -> PathBuf {
    if is_production_machine() {
        PathBuf::from(PROD_CONFIG_FILE)
    } else {
        PathBuf::from("/tmp/power_grid_cfg.json")
    }
}

pub fn data_file_path() -> PathBuf {
    if is_production_machine() {
        PathBuf::from(PROD_DATA_FILE)
    } else {
        PathBuf::from("/tmp/power_grid.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_matches_deployed_thresholds() {
        let p = mains_params(Sensitivity::Std);
        assert_eq!(p.activate_soc, 90.0);
        assert_eq!(p.activate_time, Duration::from_secs(15));
        assert_eq!(p.deactivate_soc, 100.0);
        assert_eq!(p.deactivate_time, Duration::from_secs(60));
    }

    #[test]
    fn eco_is_the_most_tolerant() {
        let eco = mains_params(Sensitivity::Eco);
        let safe = mains_params(Sensitivity::Safe);
        assert!(eco.activate_soc < safe.activate_soc);
        assert!(eco.activate_time > safe.activate_time);
    }
}
