//! User configuration for the grid controller.
//!
//! The file is shared with the touch UI, which writes it; we only read.
//! Individual keys are validated with range checks and fall back to their
//! defaults, so a partially written or hand-edited file degrades gracefully.

use std::path::Path;

use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::power::Sensitivity;

/// Relay policy selected by the `mains` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MainsMode {
    #[default]
    Auto,
    AlwaysOff,
    AlwaysOn,
}

impl MainsMode {
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(MainsMode::Auto),
            1 => Some(MainsMode::AlwaysOff),
            2 => Some(MainsMode::AlwaysOn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub mains: MainsMode,
    pub sensitivity: Sensitivity,
    pub display: u8,
    pub opt_titles: [String; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            mains: MainsMode::Auto,
            sensitivity: Sensitivity::Std,
            display: 0,
            opt_titles: ["Eco".into(), "Std".into(), "Safe".into()],
        }
    }
}

fn value_range(cfg: &Value, key: &str, default: u8, min: u8, max: u8) -> u8 {
    match cfg.get(key).and_then(Value::as_u64) {
        Some(v) if v >= min as u64 && v <= max as u64 => v as u8,
        Some(v) => {
            warn!("config key {key}={v} outside {min}..={max}, using {default}");
            default
        }
        None => default,
    }
}

fn value_str(cfg: &Value, key: &str, default: &str) -> String {
    cfg.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

impl GridConfig {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let cfg: Value = serde_json::from_str(text)?;
        let defaults = GridConfig::default();

        Ok(Self {
            mains: MainsMode::from_wire(value_range(&cfg, "mains", 0, 0, 2))
                .unwrap_or(defaults.mains),
            sensitivity: Sensitivity::from_wire(value_range(&cfg, "mains_opt", 1, 0, 2))
                .unwrap_or(defaults.sensitivity),
            display: value_range(&cfg, "display", 0, 0, 3),
            opt_titles: [
                value_str(&cfg, "opt_0_title", "Eco"),
                value_str(&cfg, "opt_1_title", "Std"),
                value_str(&cfg, "opt_2_title", "Safe"),
            ],
        })
    }

    /// Load from disk. `previous` survives a missing or corrupt file.
    pub async fn load(path: &Path, previous: Option<&GridConfig>) -> Self {
        let fallback = || previous.cloned().unwrap_or_default();
        match fs::read_to_string(path).await {
            Ok(text) => match GridConfig::parse(&text) {
                Ok(cfg) => {
                    info!(
                        "loaded config from {} (mains: {:?}, sensitivity: {:?}, display: {})",
                        path.display(),
                        cfg.mains,
                        cfg.sensitivity,
                        cfg.display
                    );
                    debug!("mains option titles: {:?}", cfg.opt_titles);
                    cfg
                }
                Err(e) => {
                    warn!("error parsing config file {}: {e}", path.display());
                    fallback()
                }
            },
            Err(_) => {
                warn!("no config file found ({})", path.display());
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = GridConfig::parse("{}").unwrap();
        assert_eq!(cfg, GridConfig::default());
    }

    #[test]
    fn keys_are_read_and_ranged() {
        let cfg = GridConfig::parse(
            r#"{"mains": 2, "mains_opt": 0, "display": 3, "opt_0_title": "Away"}"#,
        )
        .unwrap();
        assert_eq!(cfg.mains, MainsMode::AlwaysOn);
        assert_eq!(cfg.sensitivity, Sensitivity::Eco);
        assert_eq!(cfg.display, 3);
        assert_eq!(cfg.opt_titles[0], "Away");
        assert_eq!(cfg.opt_titles[1], "Std");
    }

    #[test]
    fn out_of_range_values_fall_back() {
        let cfg = GridConfig::parse(r#"{"mains": 9, "display": 12}"#).unwrap();
        assert_eq!(cfg.mains, MainsMode::Auto);
        assert_eq!(cfg.display, 0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(GridConfig::parse("{not json").is_err());
    }
}
