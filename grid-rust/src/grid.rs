//! # grid
//!
//! The power-grid control loop. Four event sources feed one cooperative
//! loop in a fixed order: BLE controller readings, the serial shunt, config
//! file edits, and UDP traffic. Every source sits behind its own error
//! boundary so a failing input cannot starve the others, and the loop only
//! ever ends on an external signal.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use dosa_wire::status::StatusFormat;
use dosa_wire::{Comms, Opcode};

use crate::ble::BleReading;
use crate::config::GridConfig;
use crate::fan::FanController;
use crate::leds::LedPanel;
use crate::mains::MainsController;
use crate::power;
use crate::shunt::ShuntReader;
use crate::state::GridState;

/// Transport poll bound per loop pass.
const RECEIVE_WAIT: Duration = Duration::from_millis(100);

/// PONG payload: the 0x78 grid marker plus the load relay state.
pub fn pong_payload(load_state: bool) -> [u8; 2] {
    [0x78, load_state as u8]
}

/// STA payload: format tag then the packed grid snapshot.
pub fn status_payload(state: &GridState) -> Vec<u8> {
    let mut payload = StatusFormat::PowerGrid.as_wire().to_le_bytes().to_vec();
    payload.extend(state.to_status().to_bytes());
    payload
}

pub struct GridSetup {
    pub cfg: GridConfig,
    pub cfg_path: PathBuf,
    pub data_path: PathBuf,
    /// PV array size, watts.
    pub pv_size: f32,
    /// Battery bank size, amp-hours.
    pub bat_size: f32,
}

pub struct GridController {
    comms: Comms,
    cfg: GridConfig,
    cfg_path: PathBuf,
    data_path: PathBuf,
    pv_size: f32,
    bat_size: f32,
    state: GridState,
    mains: MainsController,
    fan: FanController,
    leds: Option<LedPanel>,
    shunt: Option<ShuntReader>,
    ble_rx: mpsc::Receiver<BleReading>,
    watch_rx: Option<mpsc::Receiver<()>>,
}

impl GridController {
    pub fn new(
        comms: Comms,
        setup: GridSetup,
        ble_rx: mpsc::Receiver<BleReading>,
        shunt: Option<ShuntReader>,
        watch_rx: Option<mpsc::Receiver<()>>,
        fan: FanController,
        leds: Option<LedPanel>,
    ) -> Self {
        Self {
            comms,
            cfg: setup.cfg,
            cfg_path: setup.cfg_path,
            data_path: setup.data_path,
            pv_size: setup.pv_size,
            bat_size: setup.bat_size,
            state: GridState::default(),
            mains: MainsController::new(),
            fan,
            leds,
            shunt,
            ble_rx,
            watch_rx,
        }
    }

    pub async fn run(&mut self) {
        info!("Starting DOSA Power Grid Controller..");
        // Mains is still undecided; publish the pending marker for the UI.
        self.write_data_file().await;

        loop {
            self.drain_ble().await;
            self.poll_shunt().await;
            self.drain_watch().await;
            self.poll_udp().await;
        }
    }

    /// Apply queued controller readings, announce the fresh status on the
    /// wire, and recompute the outputs.
    async fn drain_ble(&mut self) {
        let mut updated = false;
        while let Ok(reading) = self.ble_rx.try_recv() {
            self.state
                .apply_ble(&reading, self.shunt.is_some(), self.bat_size);
            updated = true;
        }
        if !updated {
            return;
        }

        debug!("dispatching STA multicast");
        match self.comms.build(Opcode::Status, &status_payload(&self.state)) {
            Ok(payload) => {
                if let Err(e) = self.comms.send(&payload, None).await {
                    warn!("status multicast failed: {e}");
                }
            }
            Err(e) => warn!("could not build status frame: {e}"),
        }

        self.recompute().await;
    }

    async fn poll_shunt(&mut self) {
        let Some(shunt) = &mut self.shunt else { return };
        if let Some(batch) = shunt.poll().await {
            self.state.apply_shunt(&batch, self.bat_size);
            self.recompute().await;
        }
    }

    async fn drain_watch(&mut self) {
        let Some(rx) = &mut self.watch_rx else { return };
        let mut changed = false;
        while rx.try_recv().is_ok() {
            changed = true;
        }
        if !changed {
            return;
        }

        self.cfg = GridConfig::load(&self.cfg_path, Some(&self.cfg)).await;
        self.recompute().await;
    }

    async fn poll_udp(&mut self) {
        let Some(msg) = self.comms.receive(Some(RECEIVE_WAIT)).await else {
            return;
        };

        match msg.opcode {
            Opcode::Ping => {
                debug!("PING from {}", msg.addr);
                let payload = pong_payload(self.state.controller.load_state);
                match self.comms.build(Opcode::Pong, &payload) {
                    Ok(p) => {
                        if let Err(e) = self.comms.send(&p, Some(msg.addr)).await {
                            warn!("pong reply failed: {e}");
                        }
                    }
                    Err(e) => warn!("could not build pong: {e}"),
                }
            }
            Opcode::ReqStat => {
                debug!("REQ_STAT from {}", msg.addr);
                match self.comms.build(Opcode::Status, &status_payload(&self.state)) {
                    Ok(p) => {
                        if let Err(e) = self.comms.send(&p, Some(msg.addr)).await {
                            warn!("status reply failed: {e}");
                        }
                    }
                    Err(e) => warn!("could not build status frame: {e}"),
                }
            }
            _ => {}
        }
    }

    /// Downstream effects of a state change: relay, fans, lights, data file.
    async fn recompute(&mut self) {
        let params = power::mains_params(self.cfg.sensitivity);
        if let Some(active) = self.mains.reconsider(
            self.state.battery.soc,
            self.cfg.mains,
            &params,
            Instant::now(),
        ) {
            info!("set mains relay: {active}");
        }

        for (level, message) in self.fan.update(self.state.controller.temperature).await {
            if let Err(e) = self.comms.net_log(level, &message).await {
                warn!("temperature alert failed to send: {e}");
            }
        }
        self.state.controller.fan_speed = self.fan.last_written().unwrap_or(0);

        if let Some(panel) = &mut self.leds {
            panel.update(&self.state, self.mains.state(), self.pv_size);
        }

        self.write_data_file().await;
    }

    async fn write_data_file(&self) {
        let doc = self.state.data_file_json(
            self.mains.state().as_bool(),
            self.pv_size,
            self.bat_size,
        );
        let text = match serde_json::to_string_pretty(&doc) {
            Ok(text) => text,
            Err(e) => {
                warn!("data file serialise failed: {e}");
                return;
            }
        };

        // Write-then-rename so readers never observe a partial document.
        let tmp = self.data_path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, text).await {
            warn!("data file write failed ({}): {e}", tmp.display());
            return;
        }
        if let Err(e) = fs::rename(&tmp, &self.data_path).await {
            warn!("data file rename failed ({}): {e}", self.data_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_payload_carries_marker_and_load_state() {
        assert_eq!(pong_payload(true), [0x78, 0x01]);
        assert_eq!(pong_payload(false), [0x78, 0x00]);
    }

    #[test]
    fn status_payload_is_tagged_and_sized() {
        let mut state = GridState::default();
        state.battery.soc = 93.0;
        let payload = status_payload(&state);
        assert_eq!(payload.len(), 2 + dosa_wire::status::GridStatus::WIRE_LEN);
        assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), 1);
        assert_eq!(payload[2], 93);
    }
}
