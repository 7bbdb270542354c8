//! Session and protocol errors

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by MIC sessions
#[derive(Debug, Error)]
pub enum MicError {
    /// Bus or channel could not be opened
    #[error("CAN interface not found: {interface} {channel}")]
    TransportUnavailable { interface: String, channel: String },

    /// Host platform has no known transport mapping
    #[error("Unsupported OS: {0}")]
    UnsupportedPlatform(String),

    /// Controller id outside the addressable range
    #[error("Invalid controller ID: {0} (expected 0-127)")]
    InvalidControllerId(i64),

    /// Request issued before `activate()`
    #[error("Session is not open")]
    SessionNotOpen,

    /// Device did not answer
    #[error("No response from controller {controller_id}, try another ID")]
    NoResponse { controller_id: u8 },

    /// Device answered but the reply cannot be decoded
    #[error("Malformed telemetry payload: {reason}")]
    MalformedPayload { reason: String },

    /// Transport rejected a frame
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Firmware image path does not name a file
    #[error("Firmware image not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    /// Configuration or flashing tool setup problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other transport failure
    #[error(transparent)]
    Transport(TransportError),
}

impl MicError {
    /// True for outcomes a user can act on, false for programming defects
    pub fn is_user_actionable(&self) -> bool {
        !matches!(self, MicError::SessionNotOpen)
    }
}

impl From<TransportError> for MicError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable {
                interface, channel, ..
            } => MicError::TransportUnavailable { interface, channel },
            TransportError::SendFailed(msg) => MicError::SendFailed(msg),
            other => MicError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MicError>;
