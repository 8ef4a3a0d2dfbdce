use std::net::SocketAddr;

use crate::error::WireError;
use crate::opcode::Opcode;

/// Length of the fixed frame prefix.
pub const PREFIX_LEN: usize = 27;
/// Width of the zero-padded device-name field.
pub const DEVICE_NAME_LEN: usize = 20;

/// One decoded DOSA datagram.
///
/// Decoding is lenient: the sender's size field is parsed and exposed but not
/// verified against the actual datagram length, so consumers can choose which
/// bound to trust.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    pub addr: SocketAddr,
    pub msg_id: u16,
    pub opcode: Opcode,
    /// Total size claimed by the sender's prefix.
    pub reported_size: u16,
    /// Device name with the zero padding trimmed.
    pub device_name: String,
}

impl Frame {
    pub fn decode(packet: &[u8], addr: SocketAddr) -> Result<Self, WireError> {
        if packet.len() < PREFIX_LEN {
            return Err(WireError::NotDosaPacket);
        }

        let msg_id = u16::from_le_bytes([packet[0], packet[1]]);
        let opcode = Opcode::from_bytes([packet[2], packet[3], packet[4]]);
        let reported_size = u16::from_le_bytes([packet[5], packet[6]]);
        let device_name = String::from_utf8_lossy(&packet[7..PREFIX_LEN])
            .trim_end_matches('\0')
            .to_string();

        Ok(Self {
            data: packet.to_vec(),
            addr,
            msg_id,
            opcode,
            reported_size,
            device_name,
        })
    }

    /// The message ID as it appears on the wire, for ACK payloads.
    pub fn msg_id_bytes(&self) -> [u8; 2] {
        [self.data[0], self.data[1]]
    }

    /// Payload bytes following the prefix.
    pub fn payload(&self) -> &[u8] {
        &self.data[PREFIX_LEN..]
    }

    /// Payload bounded by the sender's size field, where that field is sane.
    pub fn sized_payload(&self) -> &[u8] {
        let end = (self.reported_size as usize).clamp(PREFIX_LEN, self.data.len());
        &self.data[PREFIX_LEN..end]
    }

    /// Number of bytes actually received.
    pub fn actual_size(&self) -> usize {
        self.data.len()
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }
}

/// Build a frame with a fresh random message ID.
pub fn encode(device_name: &str, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    encode_with_id(rand::random(), device_name, opcode, payload)
}

/// Build a frame with a caller-chosen message ID (ACK replies, tests).
pub fn encode_with_id(
    msg_id: u16,
    device_name: &str,
    opcode: Opcode,
    payload: &[u8],
) -> Result<Vec<u8>, WireError> {
    let name = device_name.as_bytes();
    if name.len() > DEVICE_NAME_LEN {
        return Err(WireError::InvalidName);
    }

    let total = PREFIX_LEN + payload.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&msg_id.to_le_bytes());
    out.extend_from_slice(&opcode.bytes());
    out.extend_from_slice(&(total as u16).to_le_bytes());
    out.extend_from_slice(name);
    out.resize(PREFIX_LEN, 0);
    out.extend_from_slice(payload);
    Ok(out)
}
