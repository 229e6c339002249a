use thiserror::Error;

/// Errors raised while decoding a frame or a response payload from the DTB.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO Error")]
    IoError(#[from] std::io::Error),
    #[error("Timed out waiting for a response header")]
    HeaderTimeout,
    #[error("Response CRC check failed")]
    CrcError,
    #[error("Payload shorter than expected")]
    PacketLengthError,
    #[error("Expected a response to call {0}, got {1}")]
    ExpectedCall(u16, u16),
    #[error("Malformed payload: {0}")]
    Payload(#[from] bincode::Error),
}

/// Errors raised by a device session and everything built on top of it.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("IO Error")]
    IoError(#[from] std::io::Error),
    #[error("Serialport Error")]
    SerialportError(#[from] serialport::Error),
    #[error("Decode Error: {0}")]
    DecodeError(#[from] DecodeError),
    #[error("Could not encode call arguments: {0}")]
    EncodeError(#[from] bincode::Error),
    #[error("No DTB connected")]
    NoDevice,
    #[error("DTB {0} not found")]
    DeviceNotFound(String),
    #[error("More than one DTB connected, choose one of: {}", .0.join(", "))]
    AmbiguousDevice(Vec<String>),
    #[error("Call {0} is not in the host call table")]
    UnknownCall(String),
    #[error("Session is closed")]
    Closed,
    #[error("DTB firmware is incompatible: {0} call table mismatches")]
    Incompatible(usize),
    #[error("Firmware upgrade failed: {0}")]
    Upgrade(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
