//! Passive packet sniffer with per-opcode annotations.

use std::time::{SystemTime, UNIX_EPOCH};

use dosa_wire::level::LogLevel;
use dosa_wire::{Comms, Opcode, WireError};

#[derive(Debug, Clone, Copy, Default)]
pub struct SnoopOptions {
    /// Skip frames whose msg_id repeats the previous one.
    pub ignore_retries: bool,
    /// Reply to triggers with an ACK.
    pub auto_ack: bool,
    /// Render IR maps and range readouts for trigger frames.
    pub print_map: bool,
    pub ignore_pings: bool,
}

pub struct Snoop {
    comms: Comms,
    opts: SnoopOptions,
    last_msg_id: Option<u16>,
}

impl Snoop {
    pub fn new(comms: Comms, opts: SnoopOptions) -> Self {
        Self {
            comms,
            opts,
            last_msg_id: None,
        }
    }

    pub async fn run(&mut self) -> Result<(), WireError> {
        loop {
            let Some(msg) = self.comms.receive(None).await else {
                continue;
            };

            if self.opts.ignore_retries && Some(msg.msg_id) == self.last_msg_id {
                continue;
            }
            if self.opts.ignore_pings && msg.opcode == Opcode::Ping {
                continue;
            }

            let mut aux = String::new();
            match msg.opcode {
                Opcode::Ack => {
                    if let Some(id) = msg.payload().get(..2) {
                        aux = format!(" // ACK ID: {}", u16::from_le_bytes([id[0], id[1]]));
                    }
                }
                Opcode::Trigger if Some(msg.msg_id) != self.last_msg_id => {
                    if self.opts.auto_ack {
                        self.comms.send_ack(msg.msg_id_bytes(), msg.addr).await?;
                        aux.push_str(" (replied)");
                    }
                    if self.opts.print_map {
                        aux.push_str(&render_trigger(msg.payload()));
                    }
                }
                Opcode::Log => {
                    let payload = msg.sized_payload();
                    if let Some(&level) = payload.first() {
                        let label = LogLevel::from_wire(level)
                            .map_or("UNKNOWN LOG-LEVEL", LogLevel::as_str);
                        let text = String::from_utf8_lossy(&payload[1..]);
                        aux = format!(" // [{label}] {text}");
                    }
                }
                Opcode::Online => aux.push_str(" // ONLINE"),
                Opcode::Begin => aux.push_str(" // BEGIN SEQUENCE"),
                Opcode::End => aux.push_str(" // COMPLETE"),
                Opcode::Ping => aux.push_str(" // PING"),
                Opcode::Pong => aux.push_str(" // PONG"),
                Opcode::Flush => aux.push_str(" // FLUSH"),
                _ => {}
            }

            println!(
                "{} [{:>5}] {} ({}): {}{}",
                timestamp_hms(),
                msg.msg_id,
                msg.addr,
                msg.device_name,
                msg.opcode,
                aux
            );
            self.last_msg_id = Some(msg.msg_id);
        }
    }
}

fn timestamp_hms() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (h, m, s) = ((secs / 3600) % 24, (secs / 60) % 60, secs % 60);
    format!("{h:02}:{m:02}:{s:02}")
}

/// Trigger payload rendering for `-m`: range distances or an IR grid map.
pub fn render_trigger(payload: &[u8]) -> String {
    match payload.first().copied() {
        Some(3) if payload.len() >= 5 => {
            let prev = u16::from_le_bytes([payload[1], payload[2]]);
            let new = u16::from_le_bytes([payload[3], payload[4]]);
            format!(" // distance: {prev} -> {new}")
        }
        Some(4) if payload.len() >= 65 => render_map(&payload[1..65]),
        _ => String::new(),
    }
}

/// 8×8 grayscale IR map as ASCII art.
pub fn render_map(pixels: &[u8]) -> String {
    let mut out = String::from("\n+--------+\n");
    for row in 0..8 {
        out.push('|');
        for col in 0..8 {
            out.push(pixel_char(pixels[row * 8 + col]));
        }
        out.push_str("|\n");
    }
    out.push_str("+--------+");
    out
}

fn pixel_char(p: u8) -> char {
    if p == 0 {
        ' '
    } else if p > 30 {
        '#'
    } else if p > 15 {
        '+'
    } else {
        '.'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_thresholds() {
        assert_eq!(pixel_char(0), ' ');
        assert_eq!(pixel_char(10), '.');
        assert_eq!(pixel_char(15), '.');
        assert_eq!(pixel_char(16), '+');
        assert_eq!(pixel_char(30), '+');
        assert_eq!(pixel_char(31), '#');
        assert_eq!(pixel_char(255), '#');
    }

    #[test]
    fn map_renders_bordered_grid() {
        let mut pixels = [0u8; 64];
        pixels[0] = 40; // top-left hot
        pixels[63] = 20; // bottom-right warm
        let map = render_map(&pixels);

        let lines: Vec<&str> = map.trim_start_matches('\n').lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "+--------+");
        assert_eq!(lines[9], "+--------+");
        assert_eq!(lines[1], "|#       |");
        assert_eq!(lines[8], "|       +|");
    }

    #[test]
    fn range_trigger_renders_distances() {
        // 500 mm -> 800 mm
        let rendered = render_trigger(&[3, 0xF4, 0x01, 0x20, 0x03]);
        assert_eq!(rendered, " // distance: 500 -> 800");
    }

    #[test]
    fn other_subtypes_render_nothing() {
        assert_eq!(render_trigger(&[1]), "");
        assert_eq!(render_trigger(&[]), "");
    }
}
