//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to open {interface} channel {channel}: {reason}")]
    Unavailable {
        interface: String,
        channel: String,
        reason: String,
    },

    #[error("Bus handle is closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}
