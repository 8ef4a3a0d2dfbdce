//! Cooling-fan PWM control.
//!
//! A dedicated microcontroller on a serial line drives the fans; we send it
//! a single byte, the duty cycle as a percentage. Speed follows controller
//! temperature on a clamped linear ramp, and a byte only goes down the line
//! when the computed speed differs from the last write.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use dosa_wire::level::LogLevel;

const BAUD_RATE: u32 = 9600;

/// Temperature alerts repeat at most this often per level.
pub const ALERT_INTERVAL: Duration = Duration::from_secs(15);

pub const WARN_TEMP: f32 = 60.0;
pub const ERROR_TEMP: f32 = 80.0;

#[derive(Debug, Clone, Copy)]
pub struct FanParams {
    pub pwm_min: u8,
    pub pwm_max: u8,
    pub low_temp: f32,
    pub high_temp: f32,
}

impl Default for FanParams {
    fn default() -> Self {
        Self {
            pwm_min: 20,
            pwm_max: 100,
            low_temp: 25.0,
            high_temp: 45.0,
        }
    }
}

/// Fan duty cycle for a controller temperature: linear between the bounds,
/// clamped at both ends.
pub fn pwm_for_temp(params: &FanParams, temp: f32) -> u8 {
    if temp <= params.low_temp {
        params.pwm_min
    } else if temp >= params.high_temp {
        params.pwm_max
    } else {
        let pos = (temp - params.low_temp) / (params.high_temp - params.low_temp);
        (pos * (params.pwm_max - params.pwm_min) as f32 + params.pwm_min as f32).round() as u8
    }
}

pub struct FanController {
    port_path: Option<String>,
    port: Option<SerialStream>,
    params: FanParams,
    last_written: Option<u8>,
    last_warn: Option<Instant>,
    last_error: Option<Instant>,
}

impl FanController {
    pub fn new(port_path: Option<String>, params: FanParams) -> Self {
        Self {
            port_path,
            port: None,
            params,
            last_written: None,
            last_warn: None,
            last_error: None,
        }
    }

    pub fn last_written(&self) -> Option<u8> {
        self.last_written
    }

    /// The byte that needs to go out for `temp`, or None when the last write
    /// already holds.
    fn next_write(&self, temp: f32) -> Option<u8> {
        let pwm = pwm_for_temp(&self.params, temp);
        (self.last_written != Some(pwm)).then_some(pwm)
    }

    fn ensure_port(&mut self) {
        let Some(path) = &self.port_path else { return };
        if self.port.is_some() {
            return;
        }
        match tokio_serial::new(path, BAUD_RATE).open_native_async() {
            Ok(port) => {
                debug!("PWM serial online on {path}");
                self.port = Some(port);
            }
            Err(e) => warn!("failed to bring PWM serial online: {e}"),
        }
    }

    /// Push the fan speed for `temp` and collect any due temperature alerts.
    /// Alerts come back as (level, message) pairs destined for the wire.
    pub async fn update(&mut self, temp: f32) -> Vec<(LogLevel, String)> {
        let alerts = self.temp_alerts(temp, Instant::now());

        if self.port_path.is_some() {
            self.ensure_port();
            if let (Some(pwm), Some(port)) = (self.next_write(temp), self.port.as_mut()) {
                debug!("set fan control to {pwm}%");
                match port.write_all(&[pwm]).await {
                    Ok(()) => self.last_written = Some(pwm),
                    Err(e) => {
                        warn!("serial communication error: {e}");
                        self.port = None;
                    }
                }
            }
        }

        alerts
    }

    /// Rate-limited over-temperature alerts: one per level per interval.
    fn temp_alerts(&mut self, temp: f32, now: Instant) -> Vec<(LogLevel, String)> {
        let mut alerts = Vec::new();

        if temp > ERROR_TEMP {
            let due = self.last_error.map_or(true, |t| now - t >= ALERT_INTERVAL);
            if due {
                self.last_error = Some(now);
                alerts.push((
                    LogLevel::Critical,
                    format!("Controller temperature critical: {temp:.0}C"),
                ));
            }
        } else if temp > WARN_TEMP {
            let due = self.last_warn.map_or(true, |t| now - t >= ALERT_INTERVAL);
            if due {
                self.last_warn = Some(now);
                alerts.push((
                    LogLevel::Error,
                    format!("Controller temperature high: {temp:.0}C"),
                ));
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pwm_is_clamped_and_linear() {
        let p = FanParams::default();
        assert_eq!(pwm_for_temp(&p, 10.0), 20);
        assert_eq!(pwm_for_temp(&p, 25.0), 20);
        assert_eq!(pwm_for_temp(&p, 45.0), 100);
        assert_eq!(pwm_for_temp(&p, 90.0), 100);
        // Midpoint: 35C is halfway through 25..45 -> 60%.
        assert_eq!(pwm_for_temp(&p, 35.0), 60);
    }

    #[test]
    fn writes_only_happen_on_change() {
        let mut fan = FanController::new(None, FanParams::default());
        assert_eq!(fan.next_write(35.0), Some(60));
        fan.last_written = Some(60);
        assert_eq!(fan.next_write(35.0), None);
        assert_eq!(fan.next_write(35.1), None); // same rounded duty
        assert_eq!(fan.next_write(45.0), Some(100));
    }

    #[test]
    fn temp_alerts_are_rate_limited_per_level() {
        let mut fan = FanController::new(None, FanParams::default());
        let t0 = Instant::now();

        let first = fan.temp_alerts(85.0, t0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, LogLevel::Critical);

        // Within the window: silent.
        assert!(fan.temp_alerts(86.0, t0 + Duration::from_secs(5)).is_empty());
        // After the window: repeats.
        assert_eq!(fan.temp_alerts(86.0, t0 + Duration::from_secs(15)).len(), 1);

        // A different level runs on its own clock.
        let warns = fan.temp_alerts(65.0, t0 + Duration::from_secs(16));
        assert_eq!(warns.len(), 1);
        assert_eq!(warns[0].0, LogLevel::Error);
    }

    #[test]
    fn cool_running_raises_nothing() {
        let mut fan = FanController::new(None, FanParams::default());
        assert!(fan.temp_alerts(40.0, Instant::now()).is_empty());
    }
}
