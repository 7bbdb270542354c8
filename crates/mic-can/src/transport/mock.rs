//! Mock transport adapter for testing

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{accepts, BusConnector, CanBus, CanFilter, CanFrame, TransportError};
use crate::config::TransportConfig;

#[derive(Default)]
struct MockState {
    available: bool,
    fail_send: bool,
    inbound: VecDeque<CanFrame>,
    /// Frames queued when a frame with the given id is sent
    replies: Vec<(u32, Vec<CanFrame>)>,
    sent: Vec<CanFrame>,
    open_handles: usize,
    open_count: usize,
}

/// Connector handing out [`MockBus`] handles that share one simulated bus
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                available: true,
                ..Default::default()
            })),
        }
    }

    /// Make subsequent `open` calls fail
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Make `send` fail on every handle
    pub fn set_fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    /// Queue a frame for delivery
    pub fn push_inbound(&self, frame: CanFrame) {
        self.state.lock().inbound.push_back(frame);
    }

    /// Queue `frames` each time a frame with `request_id` is sent
    pub fn add_reply(&self, request_id: u32, frames: Vec<CanFrame>) {
        self.state.lock().replies.push((request_id, frames));
    }

    /// Frames sent so far, in order
    pub fn sent(&self) -> Vec<CanFrame> {
        self.state.lock().sent.clone()
    }

    /// Frames queued but not yet received
    pub fn pending(&self) -> Vec<CanFrame> {
        self.state.lock().inbound.iter().copied().collect()
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }

    /// Successful `open` calls so far
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusConnector for MockConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn CanBus>, TransportError> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(TransportError::Unavailable {
                interface: config.interface.to_string(),
                channel: config.channel.clone(),
                reason: "mock channel unavailable".to_string(),
            });
        }
        state.open_handles += 1;
        state.open_count += 1;

        Ok(Box::new(MockBus {
            state: self.state.clone(),
            open: true,
        }))
    }
}

/// Handle onto the simulated bus
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
    open: bool,
}

#[async_trait]
impl CanBus for MockBus {
    async fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }

        let mut state = self.state.lock();
        if state.fail_send {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        state.sent.push(*frame);

        let queued: Vec<CanFrame> = state
            .replies
            .iter()
            .filter(|(id, _)| *id == frame.id())
            .flat_map(|(_, frames)| frames.iter().copied())
            .collect();
        state.inbound.extend(queued);

        tracing::debug!(?frame, "Mock transport: sent frame");
        Ok(())
    }

    async fn receive(
        &mut self,
        _timeout: Duration,
        filters: &[CanFilter],
    ) -> Result<Option<CanFrame>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }

        // An empty queue stands in for an elapsed timeout
        let mut state = self.state.lock();
        while let Some(frame) = state.inbound.pop_front() {
            if accepts(filters, &frame) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().open_handles -= 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for MockBus {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceKind;

    fn config() -> TransportConfig {
        TransportConfig::new(InterfaceKind::SocketCan, "vcan0")
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = MockConnector::new();
        let mut bus = connector.open(&config()).await.unwrap();
        assert_eq!(connector.open_handles(), 1);

        bus.close();
        bus.close();
        assert!(!bus.is_open());
        assert_eq!(connector.open_handles(), 0);

        drop(bus);
        assert_eq!(connector.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_handle() {
        let connector = MockConnector::new();
        {
            let _bus = connector.open(&config()).await.unwrap();
            assert_eq!(connector.open_handles(), 1);
        }
        assert_eq!(connector.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_reply_is_queued_on_send() {
        let connector = MockConnector::new();
        let reply = CanFrame::extended(0x700, &[]).unwrap();
        connector.add_reply(0x801, vec![reply]);

        let mut bus = connector.open(&config()).await.unwrap();
        assert!(bus
            .receive(Duration::from_millis(10), &[])
            .await
            .unwrap()
            .is_none());

        bus.send(&CanFrame::extended(0x801, &[0; 7]).unwrap())
            .await
            .unwrap();
        let received = bus.receive(Duration::from_millis(10), &[]).await.unwrap();
        assert_eq!(received, Some(reply));
    }

    #[tokio::test]
    async fn test_filtered_frames_are_dropped() {
        let connector = MockConnector::new();
        connector.push_inbound(CanFrame::extended(0x123, &[1]).unwrap());
        connector.push_inbound(CanFrame::extended(0x500, &[2]).unwrap());

        let mut bus = connector.open(&config()).await.unwrap();
        let filters = [CanFilter::extended(0x500, 0x7FF)];
        let frame = bus
            .receive(Duration::from_millis(10), &filters)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.data(), &[2]);
        assert!(connector.pending().is_empty());
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_io() {
        let connector = MockConnector::new();
        let mut bus = connector.open(&config()).await.unwrap();
        bus.close();

        let frame = CanFrame::extended(0x801, &[0; 7]).unwrap();
        assert_eq!(bus.send(&frame).await, Err(TransportError::Closed));
    }
}
