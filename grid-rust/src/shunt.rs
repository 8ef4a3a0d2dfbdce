//! Victron SmartShunt reader.
//!
//! The shunt streams one `KEY\tVALUE` line per metric over serial. It sits
//! directly on the battery bus, so when it is configured its readings are
//! authoritative over the BLE controller's battery and load figures.
//!
//! Lines are collected as they arrive but folded into at most one batch
//! every two seconds, so a chatty shunt cannot storm the control loop. A
//! port error closes the line; reconnection is attempted with a back-off.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

const BAUD_RATE: u32 = 19_200;

/// Minimum spacing between downstream updates.
pub const EMIT_INTERVAL: Duration = Duration::from_secs(2);
/// Wait before reopening a failed port.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// One batched set of shunt metrics. Absent keys were not seen this window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShuntBatch {
    /// Battery voltage, volts.
    pub voltage: Option<f32>,
    /// State of charge, percent.
    pub soc: Option<f32>,
    /// Instantaneous power, watts (negative = discharge).
    pub power: Option<f32>,
    /// Current, amps (negative = discharge).
    pub current: Option<f32>,
    /// Time to go at present draw, minutes.
    pub time_to_go: Option<f32>,
}

impl ShuntBatch {
    pub fn is_empty(&self) -> bool {
        *self == ShuntBatch::default()
    }

    /// Fold one serial line into the batch. Unknown keys and malformed
    /// values are ignored.
    pub fn absorb_line(&mut self, line: &str) {
        let mut parts = line.split('\t');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            return;
        };
        let Ok(raw) = value.trim().parse::<f32>() else {
            return;
        };

        match key {
            "V" => self.voltage = Some(raw / 1000.0),   // mV
            "SOC" => self.soc = Some(raw / 10.0),       // promille
            "P" => self.power = Some(raw),              // W
            "I" => self.current = Some(raw / 1000.0),   // mA
            "TTG" => self.time_to_go = Some(raw),       // minutes
            _ => {}
        }
    }
}

pub struct ShuntReader {
    path: String,
    port: Option<SerialStream>,
    buf: Vec<u8>,
    pending: ShuntBatch,
    last_emit: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl ShuntReader {
    pub fn new(path: String) -> Self {
        Self {
            path,
            port: None,
            buf: Vec::new(),
            pending: ShuntBatch::default(),
            last_emit: None,
            last_attempt: None,
        }
    }

    fn ensure_port(&mut self) {
        if self.port.is_some() {
            return;
        }
        if let Some(t) = self.last_attempt {
            if t.elapsed() < RECONNECT_BACKOFF {
                return;
            }
        }
        self.last_attempt = Some(Instant::now());

        match tokio_serial::new(&self.path, BAUD_RATE).open_native_async() {
            Ok(port) => {
                debug!("shunt serial online on {}", self.path);
                self.port = Some(port);
            }
            Err(e) => warn!("could not open shunt port {}: {e}", self.path),
        }
    }

    /// Drain whatever the shunt has sent and return a batch when the emit
    /// window allows one. Never blocks beyond a few milliseconds.
    pub async fn poll(&mut self) -> Option<ShuntBatch> {
        self.ensure_port();

        if let Some(port) = &mut self.port {
            let mut failed = false;
            let mut chunk = [0u8; 512];
            loop {
                match tokio::time::timeout(Duration::from_millis(5), port.read(&mut chunk)).await {
                    Ok(Ok(0)) => {
                        failed = true;
                        break;
                    }
                    Ok(Ok(n)) => self.buf.extend_from_slice(&chunk[..n]),
                    Ok(Err(e)) => {
                        warn!("shunt serial error: {e}");
                        failed = true;
                        break;
                    }
                    // Nothing waiting.
                    Err(_) => break,
                }
            }
            if failed {
                self.port = None;
                self.last_attempt = Some(Instant::now());
            }
        }

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Ok(text) = std::str::from_utf8(&line[..line.len() - 1]) {
                self.pending.absorb_line(text.trim_end_matches('\r'));
            }
        }

        if self.pending.is_empty() {
            return None;
        }
        let window_open = self
            .last_emit
            .map_or(true, |t| t.elapsed() >= EMIT_INTERVAL);
        if !window_open {
            return None;
        }
        self.last_emit = Some(Instant::now());
        Some(std::mem::take(&mut self.pending))
    }
}
