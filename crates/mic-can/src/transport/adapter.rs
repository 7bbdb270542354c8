//! CAN bus trait and frame types

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;
use crate::config::TransportConfig;

/// Largest 11-bit (standard) arbitration id
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest 29-bit (extended) arbitration id
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Classic CAN payload limit
pub const MAX_DATA_LEN: usize = 8;

/// A classic CAN data frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    extended: bool,
    len: u8,
    data: [u8; MAX_DATA_LEN],
}

impl CanFrame {
    /// Build a frame, validating the id range and payload length
    pub fn new(id: u32, extended: bool, data: &[u8]) -> Result<Self, TransportError> {
        let max_id = if extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if id > max_id {
            return Err(TransportError::InvalidFrame(format!(
                "arbitration id 0x{:X} exceeds 0x{:X}",
                id, max_id
            )));
        }
        if data.len() > MAX_DATA_LEN {
            return Err(TransportError::InvalidFrame(format!(
                "payload of {} bytes exceeds {}",
                data.len(),
                MAX_DATA_LEN
            )));
        }

        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            id,
            extended,
            len: data.len() as u8,
            data: buf,
        })
    }

    /// Shorthand for an extended (29-bit) frame
    pub fn extended(id: u32, data: &[u8]) -> Result<Self, TransportError> {
        Self::new(id, true, data)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanFrame")
            .field("id", &format_args!("0x{:X}", self.id))
            .field("extended", &self.extended)
            .field("data", &format_args!("{}", hex::encode(self.data())))
            .finish()
    }
}

/// Acceptance filter: a frame passes when `(frame.id & mask) == (id & mask)`
/// and its id format matches `extended`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFilter {
    pub id: u32,
    pub mask: u32,
    pub extended: bool,
}

impl CanFilter {
    pub const fn extended(id: u32, mask: u32) -> Self {
        Self {
            id,
            mask,
            extended: true,
        }
    }

    pub fn matches(&self, frame: &CanFrame) -> bool {
        frame.is_extended() == self.extended && (frame.id() & self.mask) == (self.id & self.mask)
    }
}

/// Filters are OR-combined; an empty set accepts every frame.
pub fn accepts(filters: &[CanFilter], frame: &CanFrame) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(frame))
}

/// An open CAN bus handle
///
/// A handle serves one request/response exchange at a time, which `&mut self`
/// enforces. Dropping the handle releases the OS resource.
#[async_trait]
pub trait CanBus: Send {
    /// Transmit one frame
    async fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next frame accepted by `filters`
    ///
    /// Returns `Ok(None)` when the timeout elapses without a matching frame.
    async fn receive(
        &mut self,
        timeout: Duration,
        filters: &[CanFilter],
    ) -> Result<Option<CanFrame>, TransportError>;

    /// Release the bus resource. Calling it more than once has no effect.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens bus handles for a transport configuration
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn CanBus>, TransportError>;
}
