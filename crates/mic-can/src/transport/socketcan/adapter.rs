//! Raw SocketCAN bus handle

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{
    CanFilter as KernelFilter, CanFrame as RawFrame, CanSocket, EmbeddedFrame, ExtendedId, Id,
    Socket, SocketOptions, StandardId,
};

use crate::transport::{accepts, CanBus, CanFilter, CanFrame, TransportError};

/// Extended-frame flag of the kernel's `can_id` word
const EFF_FLAG: u32 = 0x8000_0000;

/// Raw CAN socket bound to one interface
pub struct SocketCanBus {
    interface: String,
    socket: Option<Arc<Mutex<CanSocket>>>,
    /// Filters currently installed in the kernel
    installed: Vec<CanFilter>,
}

impl SocketCanBus {
    pub async fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = CanSocket::open(interface).map_err(|e| TransportError::Unavailable {
            interface: "socketcan".to_string(),
            channel: interface.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(interface, "Opened raw CAN socket");

        Ok(Self {
            interface: interface.to_string(),
            socket: Some(Arc::new(Mutex::new(socket))),
            installed: Vec::new(),
        })
    }

    fn socket(&self) -> Result<Arc<Mutex<CanSocket>>, TransportError> {
        self.socket.clone().ok_or(TransportError::Closed)
    }

    fn install_filters(&mut self, filters: &[CanFilter]) -> Result<(), TransportError> {
        if self.installed == filters {
            return Ok(());
        }

        let socket = self.socket()?;
        let guard = socket.lock();
        let result = if filters.is_empty() {
            guard.set_filter_accept_all()
        } else {
            let kernel: Vec<KernelFilter> = filters.iter().map(to_kernel_filter).collect();
            guard.set_filters(&kernel)
        };
        result.map_err(|e| TransportError::ReceiveFailed(format!("Failed to set filters: {}", e)))?;

        self.installed = filters.to_vec();
        Ok(())
    }
}

#[async_trait]
impl CanBus for SocketCanBus {
    async fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        let socket = self.socket()?;
        let raw = to_raw_frame(frame)?;

        tokio::task::spawn_blocking(move || {
            let socket_guard = socket.lock();
            socket_guard
                .write_frame(&raw)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("Task join error: {}", e)))??;

        tracing::debug!(?frame, "Frame sent");
        Ok(())
    }

    async fn receive(
        &mut self,
        timeout: Duration,
        filters: &[CanFilter],
    ) -> Result<Option<CanFrame>, TransportError> {
        self.install_filters(filters)?;

        let socket = self.socket()?;
        let filters = filters.to_vec();
        let deadline = Instant::now() + timeout;

        tokio::task::spawn_blocking(move || {
            let socket_guard = socket.lock();
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                socket_guard
                    .set_read_timeout(remaining)
                    .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

                match socket_guard.read_frame() {
                    Ok(RawFrame::Data(raw)) => {
                        let frame = match from_raw_frame(&raw) {
                            Some(frame) => frame,
                            None => continue,
                        };
                        // Frames queued before the filters changed may still arrive
                        if accepts(&filters, &frame) {
                            return Ok(Some(frame));
                        }
                        tracing::debug!(?frame, "Ignoring non-matching frame");
                    }
                    Ok(_) => {
                        // Remote and error frames carry no payload for us
                        continue;
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        return Ok(None);
                    }
                    Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
                }
            }
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("Task join error: {}", e)))?
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!(interface = %self.interface, "Closed raw CAN socket");
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

impl Drop for SocketCanBus {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_kernel_filter(filter: &CanFilter) -> KernelFilter {
    if filter.extended {
        KernelFilter::new(filter.id | EFF_FLAG, filter.mask | EFF_FLAG)
    } else {
        KernelFilter::new(filter.id, filter.mask | EFF_FLAG)
    }
}

fn to_raw_frame(frame: &CanFrame) -> Result<RawFrame, TransportError> {
    let id = if frame.is_extended() {
        ExtendedId::new(frame.id()).map(Id::Extended)
    } else {
        u16::try_from(frame.id())
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    }
    .ok_or_else(|| TransportError::InvalidFrame(format!("Invalid CAN ID: 0x{:X}", frame.id())))?;

    RawFrame::new(id, frame.data())
        .ok_or_else(|| TransportError::InvalidFrame(format!("Invalid frame: {:?}", frame)))
}

fn from_raw_frame(raw: &impl EmbeddedFrame) -> Option<CanFrame> {
    let (id, extended) = match raw.id() {
        Id::Standard(id) => (u32::from(id.as_raw()), false),
        Id::Extended(id) => (id.as_raw(), true),
    };
    CanFrame::new(id, extended, raw.data()).ok()
}
