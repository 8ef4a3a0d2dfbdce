use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::device::{DeviceState, DeviceType};

/// Outcome of folding a PONG into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongOutcome {
    /// First sighting of this peer address.
    New,
    /// Known device, liveness refreshed.
    Refreshed,
    /// Known device that had been reported unresponsive.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub addr: SocketAddr,
    pub device_name: String,
    pub device_type: DeviceType,
    pub device_state: DeviceState,
    pub last_seen: Instant,
    pub reported_unresponsive: bool,
}

/// Known peers keyed by (ip, port). A peer that moves port is a new device.
///
/// Devices are never removed on timeout, only flagged, so a later PONG can be
/// reported as a recovery. FLUSH drops everything.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<SocketAddr, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_pong(
        &mut self,
        addr: SocketAddr,
        name: &str,
        device_type: DeviceType,
        device_state: DeviceState,
        now: Instant,
    ) -> PongOutcome {
        match self.devices.get_mut(&addr) {
            Some(d) => {
                d.device_name = name.to_string();
                d.device_type = device_type;
                d.device_state = device_state;
                d.last_seen = now;
                if d.reported_unresponsive {
                    d.reported_unresponsive = false;
                    PongOutcome::Recovered
                } else {
                    PongOutcome::Refreshed
                }
            }
            None => {
                self.devices.insert(
                    addr,
                    DeviceRecord {
                        addr,
                        device_name: name.to_string(),
                        device_type,
                        device_state,
                        last_seen: now,
                        reported_unresponsive: false,
                    },
                );
                PongOutcome::New
            }
        }
    }

    /// Devices newly past the liveness threshold. The unresponsive flag is set
    /// before returning, so each device is reported exactly once per outage.
    pub fn mark_stale(&mut self, now: Instant, threshold: Duration) -> Vec<DeviceRecord> {
        let mut stale = Vec::new();
        for d in self.devices.values_mut() {
            if !d.reported_unresponsive && now.saturating_duration_since(d.last_seen) > threshold {
                d.reported_unresponsive = true;
                stale.push(d.clone());
            }
        }
        stale
    }

    pub fn flush(&mut self) {
        self.devices.clear();
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&DeviceRecord> {
        self.devices.get(addr)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.values().find(|d| d.device_name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(host: u8) -> SocketAddr {
        format!("10.0.0.{host}:6901").parse().unwrap()
    }

    #[test]
    fn first_pong_creates_then_refreshes() {
        let mut reg = DeviceRegistry::new();
        let t0 = Instant::now();
        let outcome = reg.observe_pong(addr(1), "gate", DeviceType::Switch, DeviceState::Ok, t0);
        assert_eq!(outcome, PongOutcome::New);
        let outcome = reg.observe_pong(addr(1), "gate", DeviceType::Switch, DeviceState::Ok, t0);
        assert_eq!(outcome, PongOutcome::Refreshed);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn port_change_is_a_new_device() {
        let mut reg = DeviceRegistry::new();
        let t0 = Instant::now();
        reg.observe_pong(addr(1), "gate", DeviceType::Switch, DeviceState::Ok, t0);
        let other: SocketAddr = "10.0.0.1:7000".parse().unwrap();
        let outcome = reg.observe_pong(other, "gate", DeviceType::Switch, DeviceState::Ok, t0);
        assert_eq!(outcome, PongOutcome::New);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn stale_devices_are_flagged_once() {
        let mut reg = DeviceRegistry::new();
        let t0 = Instant::now();
        reg.observe_pong(addr(1), "gate", DeviceType::Switch, DeviceState::Ok, t0);

        let threshold = Duration::from_secs(60);
        // Not yet past the threshold.
        assert!(reg.mark_stale(t0 + Duration::from_secs(30), threshold).is_empty());

        let stale = reg.mark_stale(t0 + Duration::from_secs(120), threshold);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].device_name, "gate");
        assert!(reg.get(&addr(1)).unwrap().reported_unresponsive);

        // Already reported; not returned again.
        assert!(reg.mark_stale(t0 + Duration::from_secs(240), threshold).is_empty());
    }

    #[test]
    fn pong_after_staleness_is_a_recovery() {
        let mut reg = DeviceRegistry::new();
        let t0 = Instant::now();
        reg.observe_pong(addr(1), "gate", DeviceType::Switch, DeviceState::Ok, t0);
        reg.mark_stale(t0 + Duration::from_secs(120), Duration::from_secs(60));

        let outcome = reg.observe_pong(
            addr(1),
            "gate",
            DeviceType::Switch,
            DeviceState::Ok,
            t0 + Duration::from_secs(130),
        );
        assert_eq!(outcome, PongOutcome::Recovered);
        assert!(!reg.get(&addr(1)).unwrap().reported_unresponsive);
    }

    #[test]
    fn flush_drops_all_records() {
        let mut reg = DeviceRegistry::new();
        let t0 = Instant::now();
        reg.observe_pong(addr(1), "a", DeviceType::Monitor, DeviceState::Ok, t0);
        reg.observe_pong(addr(2), "b", DeviceType::Button, DeviceState::Ok, t0);
        reg.flush();
        assert!(reg.is_empty());
    }
}
