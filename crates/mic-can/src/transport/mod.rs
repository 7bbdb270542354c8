//! Transport layer for MIC communication
//!
//! This module provides CAN bus access for talking to motor controllers:
//! - SocketCAN adapter for raw CAN frames (Linux only)
//! - Mock adapter for testing
//!
//! PCAN is recognised as an interface kind but has no driver binding in this
//! crate; opening it reports the channel as unavailable.
//!
//! # Example
//!
//! ```ignore
//! use mic_can::transport::{BusConnector, CanFrame, SystemConnector};
//! use mic_can::config::TransportConfig;
//!
//! let config = TransportConfig::for_host()?;
//! let mut bus = SystemConnector.open(&config).await?;
//! bus.send(&CanFrame::extended(0x801, &[0; 7])?).await?;
//! let reply = bus.receive(Duration::from_secs(5), &[]).await?;
//! bus.close();
//! ```

mod adapter;
pub mod error;
pub mod mock;
mod probe;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::{
    accepts, BusConnector, CanBus, CanFilter, CanFrame, MAX_DATA_LEN, MAX_EXTENDED_ID,
    MAX_STANDARD_ID,
};
pub use error::TransportError;
pub use probe::probe;

use async_trait::async_trait;

use crate::config::{InterfaceKind, TransportConfig};

/// Opens real bus handles for the interface named in the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

#[async_trait]
impl BusConnector for SystemConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn CanBus>, TransportError> {
        match config.interface {
            #[cfg(all(target_os = "linux", feature = "socketcan"))]
            InterfaceKind::SocketCan => {
                let bus = socketcan::SocketCanBus::open(&config.channel).await?;
                Ok(Box::new(bus))
            }
            #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
            InterfaceKind::SocketCan => Err(unavailable(
                config,
                "SocketCAN requires Linux and the 'socketcan' feature",
            )),
            InterfaceKind::Pcan => Err(unavailable(
                config,
                "PCAN driver binding is not available in this build",
            )),
        }
    }
}

fn unavailable(config: &TransportConfig, reason: &str) -> TransportError {
    TransportError::Unavailable {
        interface: config.interface.to_string(),
        channel: config.channel.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pcan_is_unavailable() {
        let config = TransportConfig::new(InterfaceKind::Pcan, "PCAN_USBBUS1");
        let err = SystemConnector.open(&config).await.err().unwrap();
        match err {
            TransportError::Unavailable {
                interface, channel, ..
            } => {
                assert_eq!(interface, "pcan");
                assert_eq!(channel, "PCAN_USBBUS1");
            }
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }
}
