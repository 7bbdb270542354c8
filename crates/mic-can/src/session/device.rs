//! Session against one motor controller

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::{ControllerId, SessionState};
use crate::config::{SessionConfig, TransportConfig};
use crate::error::MicError;
use crate::flash::{
    check_firmware, orchestrate, FlashOptions, FlashPrimitive, FlashTarget, UploadProgressEvent,
};
use crate::telemetry::{self, TelemetryRecord};
use crate::transport::{probe, BusConnector, CanBus};

/// Session with a single controller
///
/// Created Closed. `activate()` opens the bus, `deactivate()` (or drop)
/// releases it. Requests issued while Closed fail with
/// [`MicError::SessionNotOpen`].
pub struct DeviceSession {
    target: FlashTarget,
    config: SessionConfig,
    connector: Arc<dyn BusConnector>,
    flasher: Arc<dyn FlashPrimitive>,
    bus: Option<Box<dyn CanBus>>,
    span: Span,
}

impl DeviceSession {
    /// Create a session after checking that the transport can be opened
    pub async fn new(
        controller: ControllerId,
        transport: TransportConfig,
        config: SessionConfig,
        connector: Arc<dyn BusConnector>,
        flasher: Arc<dyn FlashPrimitive>,
    ) -> Result<Self, MicError> {
        let span = info_span!(
            "mic_session",
            controller_id = controller.get(),
            interface = %transport.interface,
            channel = %transport.channel,
        );

        if !probe(connector.as_ref(), &transport).instrument(span.clone()).await {
            return Err(MicError::TransportUnavailable {
                interface: transport.interface.to_string(),
                channel: transport.channel,
            });
        }

        Ok(Self {
            target: FlashTarget {
                controller,
                transport,
            },
            config,
            connector,
            flasher,
            bus: None,
            span,
        })
    }

    pub fn controller(&self) -> ControllerId {
        self.target.controller
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.target.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Span every operation of this session logs under
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn state(&self) -> SessionState {
        match &self.bus {
            Some(bus) if bus.is_open() => SessionState::Open,
            _ => SessionState::Closed,
        }
    }

    /// Open the bus. Activating an open session is a no-op.
    pub async fn activate(&mut self) -> Result<(), MicError> {
        if self.state() == SessionState::Open {
            return Ok(());
        }

        let bus = self
            .connector
            .open(&self.target.transport)
            .instrument(self.span.clone())
            .await?;
        self.bus = Some(bus);

        let _enter = self.span.enter();
        debug!("Session activated");
        Ok(())
    }

    /// Release the bus. Safe to call in any state.
    pub fn deactivate(&mut self) {
        if let Some(mut bus) = self.bus.take() {
            bus.close();
            let _enter = self.span.enter();
            debug!("Session deactivated");
        }
    }

    fn bus(&mut self) -> Result<&mut (dyn CanBus + 'static), MicError> {
        match self.bus.as_mut() {
            Some(bus) if bus.is_open() => Ok(bus.as_mut()),
            _ => Err(MicError::SessionNotOpen),
        }
    }

    /// Check whether the controller answers.
    ///
    /// `Ok(false)` means no device answered; that is an expected outcome.
    pub async fn ping(&mut self) -> Result<bool, MicError> {
        let options = FlashOptions::from(&self.config);
        let span = self.span.clone();
        let flasher = self.flasher.clone();
        let target = self.target.clone();
        let bus = self.bus()?;

        let present = flasher
            .ping(bus, &target, &options)
            .instrument(span.clone())
            .await?;

        let _enter = span.enter();
        if present {
            info!("Controller answered ping");
        } else {
            warn!("No answer to ping");
        }
        Ok(present)
    }

    /// Request and decode the controller's device information
    pub async fn retrieve_info(&mut self, timeout: Duration) -> Result<TelemetryRecord, MicError> {
        let span = self.span.clone();
        let request = telemetry::info_request(self.target.controller)?;
        let bus = self.bus()?;

        async move {
            bus.send(&request).await?;
            debug!(can_id = %format_args!("0x{:X}", request.id()), "Info request sent");

            let payload = telemetry::collect_reply(bus, timeout).await?;
            debug!(bytes = payload.len(), "Info reply collected");

            let record = telemetry::decode(&payload)?;
            info!(
                firmware = %record.firmware_version,
                status = %record.fw_status,
                hardware = %record.hardware_name,
                "Device information received"
            );
            Ok::<_, MicError>(record)
        }
        .instrument(span)
        .await
    }

    /// Start a firmware upload.
    ///
    /// The caller must have seen a successful `ping()` first. The returned
    /// stream ends with exactly one `Completed` event and cannot be restarted.
    pub async fn upload(
        &mut self,
        firmware: &Path,
    ) -> Result<BoxStream<'_, UploadProgressEvent>, MicError> {
        let firmware = check_firmware(firmware)?;
        let options = FlashOptions::from(&self.config);
        let span = self.span.clone();
        let flasher = self.flasher.as_ref();
        let target = &self.target;
        let bus = match self.bus.as_mut() {
            Some(bus) if bus.is_open() => bus.as_mut(),
            _ => return Err(MicError::SessionNotOpen),
        };

        {
            let _enter = span.enter();
            info!(firmware = %firmware.display(), "Controller found, flashing firmware");
        }

        let steps = flasher
            .upload(bus, target, &firmware, &options)
            .instrument(span)
            .await?;
        Ok(orchestrate(steps))
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.deactivate();
    }
}
