//! # monitor
//!
//! The security bot's event pipeline: ingest frames from the wire, classify
//! by opcode, and fan out to the log server, alert endpoints, voice, and the
//! device registry.
//!
//! One cooperative loop drives everything. Each pass runs the heartbeat and
//! ping cadences off the monotonic clock, sweeps the registry for devices
//! that went quiet, then polls the transport for at most 100 ms. Inbound
//! retransmits are dropped against the message history before they reach a
//! handler.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use dosa_wire::frame::Frame;
use dosa_wire::history::MessageHistory;
use dosa_wire::level::{AlertCategory, LockState, LogLevel, SecurityLevel};
use dosa_wire::registry::{DeviceRegistry, PongOutcome};
use dosa_wire::settings;
use dosa_wire::transport::ACK_DEADLINE;
use dosa_wire::{Comms, Opcode, WireError};

use crate::alerts::{AlertRecord, AlertSink};
use crate::config::{PlayAction, SecbotConfig};
use crate::flags::FeatureFlags;
use crate::voice::VoiceSink;

/// Transport poll bound per loop pass; the pipeline's pacing quantum.
const RECEIVE_WAIT: Duration = Duration::from_millis(100);

const STATSD_METRIC: &[u8] = b"dosa.secbot.heartbeat:1|c";

pub struct SecBot {
    comms: Comms,
    cfg: SecbotConfig,
    alerts: AlertSink,
    voice: VoiceSink,
    flags: FeatureFlags,
    registry: DeviceRegistry,
    history: MessageHistory,
    /// Ephemeral socket for statsd and log-server datagrams.
    report_sock: UdpSocket,
    last_ping: Option<Instant>,
    last_heartbeat: Option<Instant>,
}

impl SecBot {
    pub async fn new(
        comms: Comms,
        cfg: SecbotConfig,
        alerts: AlertSink,
        voice: VoiceSink,
        flags: FeatureFlags,
    ) -> Result<Self, WireError> {
        let report_sock = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            comms,
            cfg,
            alerts,
            voice,
            flags,
            registry: DeviceRegistry::new(),
            history: MessageHistory::new(),
            report_sock,
            last_ping: None,
            last_heartbeat: None,
        })
    }

    /// Announce presence and run the pipeline until the task is cancelled.
    pub async fn run(&mut self, announce: bool) -> Result<(), WireError> {
        info!("Security Bot online");
        let online = self.comms.build(Opcode::Online, &[])?;
        self.comms.send(&online, None).await?;

        if announce {
            info!("Stats server: {}", self.cfg.logging.statsd.address());
            info!("Log server:   {}", self.cfg.logging.logs.address());
            self.say("DOSA Security Bot online", true).await;
        }

        loop {
            self.do_heartbeat().await;
            self.check_devices().await;
            self.poll_packets().await;
        }
    }

    async fn say(&self, text: &str, wait: bool) {
        if self.flags.is_enabled("secbot-voice") {
            self.voice.play(text, wait).await;
        }
    }

    async fn do_heartbeat(&mut self) {
        let interval = Duration::from_secs(self.cfg.general.heartbeat);
        let due = self
            .last_heartbeat
            .map_or(true, |t| t.elapsed() > interval);
        if !due {
            return;
        }

        let target = self.cfg.logging.statsd.address();
        if let Err(e) = self.report_sock.send_to(STATSD_METRIC, &target).await {
            warn!("statsd heartbeat to {target} failed: {e}");
        }
        self.last_heartbeat = Some(Instant::now());
    }

    /// Ping the fleet on its cadence, and raise incidents for devices that
    /// stopped answering.
    async fn check_devices(&mut self) {
        let interval = Duration::from_secs(self.cfg.monitor.ping);
        if self.last_ping.map_or(true, |t| t.elapsed() > interval) {
            match self.comms.build(Opcode::Ping, &[]) {
                Ok(ping) => {
                    if let Err(e) = self.comms.send(&ping, None).await {
                        warn!("ping broadcast failed: {e}");
                    }
                }
                Err(e) => warn!("could not build ping: {e}"),
            }
            self.last_ping = Some(Instant::now());
        }

        let timeout = Duration::from_secs(self.cfg.monitor.device_timeout);
        let stale = self.registry.mark_stale(Instant::now(), timeout);
        for d in stale {
            let place = format!("{} at {}", d.device_name, d.addr);
            if let Err(e) = self
                .comms
                .net_log(LogLevel::Error, &format!("Device unresponsive: {place}"))
                .await
            {
                warn!("net log failed: {e}");
            }
            self.say(&format!("Alert, {} is not responding", d.device_name), false)
                .await;
            self.alert(AlertRecord {
                device: d.device_name.clone(),
                message: format!("{} is not responding", d.device_name),
                description: None,
                category: AlertCategory::Network,
                level: LogLevel::Error.as_str().into(),
            })
            .await;
        }
    }

    /// One transport poll: drop retransmits, then classify.
    async fn poll_packets(&mut self) {
        let Some(msg) = self.comms.receive(Some(RECEIVE_WAIT)).await else {
            return;
        };

        if self.history.observe(msg.addr, msg.msg_id) {
            debug!("dropping retransmit {} from {}", msg.msg_id, msg.addr);
            return;
        }

        self.dispatch(msg).await;
    }

    async fn dispatch(&mut self, msg: Frame) {
        match msg.opcode {
            // Pings and acks stay out of the logs; a pending ack wait is
            // satisfied inside the transport.
            Opcode::Ping | Opcode::Ack => {}
            Opcode::Pong => self.on_pong(msg).await,
            Opcode::Log => self.on_log(msg).await,
            Opcode::Security => self.on_security(msg).await,
            Opcode::Trigger => self.on_trigger(msg).await,
            Opcode::Flush => self.on_flush(msg).await,
            Opcode::Play => self.on_play(msg).await,
            Opcode::Begin => self.on_sequence(msg, " | BEGIN SEQUENCE").await,
            Opcode::End => self.on_sequence(msg, " | COMPLETE").await,
            _ => self.forward_log(&msg, "").await,
        }
    }

    async fn on_pong(&mut self, msg: Frame) {
        let payload = msg.payload();
        let device_type = dosa_wire::device::DeviceType::from_wire(*payload.first().unwrap_or(&0));
        let device_state = dosa_wire::device::DeviceState::from_wire(*payload.get(1).unwrap_or(&0));

        let outcome = self.registry.observe_pong(
            msg.addr,
            &msg.device_name,
            device_type,
            device_state,
            Instant::now(),
        );

        match outcome {
            PongOutcome::New => {
                info!("Found device: {} ({})", msg.device_name, msg.addr);
            }
            PongOutcome::Refreshed => {}
            PongOutcome::Recovered => {
                if let Err(e) = self
                    .comms
                    .net_log(
                        LogLevel::Warning,
                        &format!("Device recovery: {}", msg.device_name),
                    )
                    .await
                {
                    warn!("net log failed: {e}");
                }
                if self.cfg.monitor.report_recovery {
                    self.say(
                        &format!("Notice, {} is back online", msg.device_name),
                        false,
                    )
                    .await;
                    self.alert(AlertRecord {
                        device: msg.device_name.clone(),
                        message: format!("{} is back online", msg.device_name),
                        description: None,
                        category: AlertCategory::Network,
                        level: LogLevel::Warning.as_str().into(),
                    })
                    .await;
                }
            }
        }
    }

    async fn on_log(&mut self, msg: Frame) {
        let payload = msg.sized_payload();
        let Some(&level_byte) = payload.first() else {
            self.forward_log(&msg, "").await;
            return;
        };
        let message = String::from_utf8_lossy(&payload[1..]).to_string();

        // Every log is acked and forwarded, whatever the level.
        let aux = format!(" | {} | {}", level_label(level_byte), message);
        self.forward_log(&msg, &aux).await;
        self.ack(&msg).await;

        // Our own error reports must not loop back through the alert path.
        if msg.device_name == self.comms.device_name() {
            return;
        }

        match LogLevel::from_wire(level_byte) {
            Some(LogLevel::Critical) => {
                self.say(
                    &format!("Warning, {} critical. {}.", msg.device_name, message),
                    false,
                )
                .await;
                self.alert(AlertRecord {
                    device: msg.device_name.clone(),
                    message: format!("{} critical", msg.device_name),
                    description: Some(message),
                    category: AlertCategory::Network,
                    level: LogLevel::Critical.as_str().into(),
                })
                .await;
            }
            Some(LogLevel::Error) => {
                self.say(
                    &format!("Warning, {} error. {}.", msg.device_name, message),
                    false,
                )
                .await;
            }
            _ => {}
        }
    }

    async fn on_security(&mut self, msg: Frame) {
        let level_byte = msg.payload().first().copied().unwrap_or(0);
        let level = SecurityLevel::from_wire(level_byte);
        let label = level.map_or("UNKNOWN", SecurityLevel::as_str);

        self.forward_log(&msg, &format!(" | {label}")).await;
        self.ack(&msg).await;

        let spoken = match level {
            Some(SecurityLevel::Alert) => {
                format!("Security alert, {}, activity", msg.device_name)
            }
            Some(SecurityLevel::Breach) => {
                format!("Security alert, {}, breach", msg.device_name)
            }
            Some(SecurityLevel::Tamper) => {
                format!("Security alert, {}, tamper warning", msg.device_name)
            }
            Some(SecurityLevel::Panic) => {
                format!("Security alert, {}, panic alarm triggered", msg.device_name)
            }
            None => format!("Security alert, {}", msg.device_name),
        };

        self.alert(AlertRecord {
            device: msg.device_name.clone(),
            message: spoken.clone(),
            description: None,
            category: AlertCategory::Security,
            level: label.into(),
        })
        .await;
        self.say(&spoken, false).await;
    }

    async fn on_trigger(&mut self, msg: Frame) {
        let aux = trigger_annotation(msg.payload());
        self.forward_log(&msg, &aux).await;
    }

    async fn on_flush(&mut self, msg: Frame) {
        info!("Network flush initiated by {}", msg.device_name);
        self.forward_log(&msg, "").await;
        self.registry.flush();
        // Force a re-enumeration ping on the next pass.
        self.last_ping = None;
    }

    async fn on_sequence(&mut self, msg: Frame, aux: &str) {
        self.ack(&msg).await;
        self.forward_log(&msg, aux).await;
    }

    async fn on_play(&mut self, msg: Frame) {
        self.ack(&msg).await;
        let play = String::from_utf8_lossy(msg.sized_payload()).to_string();
        self.forward_log(&msg, &format!(" | PLAY | {play}")).await;
        self.run_play(&play).await;
    }

    async fn run_play(&mut self, play: &str) {
        let Some(actions) = self.cfg.plays.get(play).map(|p| p.actions.clone()) else {
            warn!("unknown play requested: {play}");
            return;
        };

        info!("run play: {play}");
        for action in actions {
            match action {
                PlayAction::Announce { value } => self.say(&value, true).await,
                PlayAction::SetLock { devices, value } => {
                    self.run_set_lock(&devices, value).await
                }
            }
        }
    }

    async fn run_set_lock(&mut self, devices: &[String], value: u8) {
        let Some(state) = LockState::from_wire(value) else {
            let _ = self
                .comms
                .net_log(LogLevel::Warning, &format!("Bad lock state in play: {value}"))
                .await;
            return;
        };

        for name in devices {
            let Some(target) = self.registry.find_by_name(name).map(|d| d.addr) else {
                let note = format!("Unknown device in play: {name}");
                let _ = self.comms.net_log(LogLevel::Warning, &note).await;
                self.say(&note, false).await;
                continue;
            };

            let applied = match self.comms.build(Opcode::ConfigSetting, &settings::lock_payload(state)) {
                Ok(payload) => self
                    .comms
                    .send_with_ack(&payload, target, ACK_DEADLINE)
                    .await
                    .unwrap_or(false),
                Err(_) => false,
            };

            if applied {
                let _ = self
                    .comms
                    .net_log(LogLevel::Info, &format!("Set {name} to lock state {state}"))
                    .await;
            } else {
                let note = format!("Failed to set {name} to lock state {state}");
                let _ = self.comms.net_log(LogLevel::Error, &note).await;
                self.say(&format!("Error executing play: {note}"), false).await;
            }
        }
    }

    /// Render one line and send it to the log server.
    async fn forward_log(&self, msg: &Frame, aux: &str) {
        let line = format!(
            "{} [{:>5}] {} ({}): {}{}",
            timestamp_hms(),
            msg.msg_id,
            msg.addr,
            msg.device_name,
            msg.opcode.to_string().to_uppercase(),
            aux
        );
        let target = self.cfg.logging.logs.address();
        if let Err(e) = self.report_sock.send_to(line.as_bytes(), &target).await {
            warn!("log forward to {target} failed: {e}");
        }
    }

    async fn ack(&self, msg: &Frame) {
        if let Err(e) = self.comms.send_ack(msg.msg_id_bytes(), msg.addr).await {
            warn!("ack to {} failed: {e}", msg.addr);
        }
    }

    /// Raise an incident. Endpoint failures only ever log WARNING, so the
    /// alert path can never recurse through itself.
    async fn alert(&self, record: AlertRecord) {
        match self.alerts.publish(&record).await {
            Ok(notified) => {
                for url in notified {
                    let note = format!("{} alert dispatched to {url}", record.category);
                    info!("{note}");
                    let _ = self.comms.net_log(LogLevel::Warning, &note).await;
                }
            }
            Err(e) => {
                warn!("alert dispatch failed: {e}");
                let _ = self
                    .comms
                    .net_log(
                        LogLevel::Warning,
                        &format!("SecBot failed to page alert for device {}", record.device),
                    )
                    .await;
            }
        }
    }
}

/// Wall-clock HH:MM:SS (UTC) for log-server lines.
fn timestamp_hms() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (h, m, s) = ((secs / 3600) % 24, (secs / 60) % 60, secs % 60);
    format!("{h:02}:{m:02}:{s:02}")
}

fn level_label(v: u8) -> &'static str {
    LogLevel::from_wire(v).map_or("UNKNOWN LOG-LEVEL", LogLevel::as_str)
}

/// Human annotation for a trigger payload's sub-type byte.
fn trigger_annotation(payload: &[u8]) -> String {
    match payload.first().copied() {
        Some(0) => " | UNKNOWN".into(),
        Some(1) => " | BUTTON".into(),
        Some(2) => " | SENSOR".into(),
        Some(3) => {
            // Ranging sensor: previous and current distance in mm.
            if payload.len() >= 5 {
                let prev = u16::from_le_bytes([payload[1], payload[2]]);
                let new = u16::from_le_bytes([payload[3], payload[4]]);
                format!(" | RANGE | {prev} | {new}")
            } else {
                " | RANGE".into()
            }
        }
        // IR grid map: too much for a single log line, flag it only.
        Some(4) => " | MAP".into(),
        Some(100) => " | AUTO".into(),
        _ => String::new(),
    }
}
