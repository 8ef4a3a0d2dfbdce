use thiserror::Error;

/// Errors produced by the wire codec and transport.
#[derive(Debug, Error)]
pub enum WireError {
    /// Datagram too short to carry the DOSA prefix.
    #[error("not a DOSA packet")]
    NotDosaPacket,

    /// Prefix present but a field is malformed.
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// Device name does not fit the 20-byte wire field.
    #[error("device name cannot exceed 20 bytes")]
    InvalidName,

    /// Remote-setting value fails validation before it is sent.
    #[error("invalid setting: {0}")]
    InvalidSetting(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
