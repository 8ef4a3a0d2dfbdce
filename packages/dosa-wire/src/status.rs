/// Discriminator carried in the first two payload bytes of a `sta` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFormat {
    PowerGrid,
}

impl StatusFormat {
    pub fn as_wire(self) -> u16 {
        match self {
            StatusFormat::PowerGrid => 1,
        }
    }

    pub fn from_wire(v: u16) -> Option<Self> {
        match v {
            1 => Some(StatusFormat::PowerGrid),
            _ => None,
        }
    }
}

/// Snapshot of the power-grid metrics as carried on the wire.
///
/// Packing is little-endian in declaration order; voltages are carried ×10 so
/// a tenth of a volt survives the integer encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridStatus {
    pub battery_soc: u8,
    pub battery_voltage: f32,
    pub battery_temperature: i16,
    pub pv_power: u16,
    pub pv_voltage: f32,
    pub pv_provided: u16,
    pub load_state: bool,
    pub load_power: u16,
    pub load_consumed: u16,
    pub controller_temperature: i16,
}

impl GridStatus {
    pub const WIRE_LEN: usize = 18;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_LEN);
        out.push(self.battery_soc);
        out.extend_from_slice(&((self.battery_voltage * 10.0).round() as u16).to_le_bytes());
        out.extend_from_slice(&self.battery_temperature.to_le_bytes());
        out.extend_from_slice(&self.pv_power.to_le_bytes());
        out.extend_from_slice(&((self.pv_voltage * 10.0).round() as u16).to_le_bytes());
        out.extend_from_slice(&self.pv_provided.to_le_bytes());
        out.push(self.load_state as u8);
        out.extend_from_slice(&self.load_power.to_le_bytes());
        out.extend_from_slice(&self.load_consumed.to_le_bytes());
        out.extend_from_slice(&self.controller_temperature.to_le_bytes());
        out
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < Self::WIRE_LEN {
            return None;
        }
        let u16_at = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([b[i], b[i + 1]]);
        Some(Self {
            battery_soc: b[0],
            battery_voltage: u16_at(1) as f32 / 10.0,
            battery_temperature: i16_at(3),
            pv_power: u16_at(5),
            pv_voltage: u16_at(7) as f32 / 10.0,
            pv_provided: u16_at(9),
            load_state: b[11] != 0,
            load_power: u16_at(12),
            load_consumed: u16_at(14),
            controller_temperature: i16_at(16),
        })
    }
}
