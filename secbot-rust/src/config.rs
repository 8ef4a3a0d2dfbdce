use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

/// One UDP endpoint from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub server: String,
    pub port: u16,
}

impl Endpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds between statsd heartbeats.
    pub heartbeat: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { heartbeat: 15 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between broadcast pings.
    pub ping: u64,
    /// Seconds of silence before a device is declared unresponsive.
    #[serde(rename = "device-timeout")]
    pub device_timeout: u64,
    /// Vocalise unresponsive device recovery.
    #[serde(rename = "report-recovery")]
    pub report_recovery: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping: 10,
            device_timeout: 60,
            report_recovery: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub statsd: Endpoint,
    pub logs: Endpoint,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            statsd: Endpoint {
                server: "127.0.0.1".into(),
                port: 8125,
            },
            logs: Endpoint {
                server: "127.0.0.1".into(),
                port: 10518,
            },
        }
    }
}

/// One step of a playbook.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PlayAction {
    /// Vocalise a message.
    Announce { value: String },
    /// Push a lock state to named devices.
    SetLock { devices: Vec<String>, value: u8 },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Play {
    #[serde(default)]
    pub actions: Vec<PlayAction>,
}

/// Typed view of the secbot config file, populated once at start.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecbotConfig {
    pub general: GeneralConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
    /// Alert category → webhook endpoint URLs.
    pub alerts: HashMap<String, Vec<String>>,
    /// Play name → actions.
    pub plays: HashMap<String, Play>,
}

impl SecbotConfig {
    /// Load from disk. Missing or corrupt files fall back to defaults.
    pub async fn load(path: &Path) -> Self {
        match fs::read_to_string(path).await {
            Ok(data) => match serde_json::from_str::<SecbotConfig>(&data) {
                Ok(cfg) => {
                    info!(
                        "Loaded config from {} ({} alert categories, {} plays)",
                        path.display(),
                        cfg.alerts.len(),
                        cfg.plays.len()
                    );
                    cfg
                }
                Err(e) => {
                    warn!("Failed to parse {}: {e}, using defaults", path.display());
                    SecbotConfig::default()
                }
            },
            Err(_) => {
                info!("No config at {}, using defaults", path.display());
                SecbotConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_builtins() {
        let cfg: SecbotConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.general.heartbeat, 15);
        assert_eq!(cfg.monitor.ping, 10);
        assert_eq!(cfg.monitor.device_timeout, 60);
        assert!(cfg.monitor.report_recovery);
        assert_eq!(cfg.logging.statsd.port, 8125);
        assert_eq!(cfg.logging.logs.port, 10518);
    }

    #[test]
    fn plays_and_alerts_parse() {
        let cfg: SecbotConfig = serde_json::from_str(
            r#"{
                "monitor": {"ping": 5, "device-timeout": 30, "report-recovery": false},
                "alerts": {"security": ["http://hooks.local/sec"]},
                "plays": {
                    "lockdown": {"actions": [
                        {"action": "announce", "value": "Locking down"},
                        {"action": "set-lock", "devices": ["front door"], "value": 1}
                    ]}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.monitor.ping, 5);
        assert!(!cfg.monitor.report_recovery);
        assert_eq!(cfg.alerts["security"].len(), 1);
        let play = &cfg.plays["lockdown"];
        assert_eq!(play.actions.len(), 2);
        assert!(matches!(&play.actions[0], PlayAction::Announce { value } if value == "Locking down"));
        assert!(
            matches!(&play.actions[1], PlayAction::SetLock { devices, value: 1 } if devices[0] == "front door")
        );
    }
}
