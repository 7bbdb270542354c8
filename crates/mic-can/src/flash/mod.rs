//! Firmware upload
//!
//! The flashing algorithm itself is supplied by a [`FlashPrimitive`]. This
//! module turns the primitive's raw element stream into
//! [`UploadProgressEvent`]s.
//!
//! Two primitives ship with the crate:
//! - [`CommandFlasher`] bridges to an external flashing tool process
//! - [`ScriptedFlasher`] replays canned results for tests

mod command;
pub mod mock;
mod orchestrator;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{SessionConfig, TransportConfig};
use crate::error::MicError;
use crate::session::ControllerId;
use crate::transport::CanBus;

pub use command::CommandFlasher;
pub use mock::ScriptedFlasher;
pub use orchestrator::{orchestrate, UploadProgressEvent};

/// One element yielded by a flashing primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlashStep {
    /// Upload percentage, nominally 0-100
    Percent(f64),
    /// Final outcome
    Outcome(bool),
}

/// Controller and bus a primitive talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashTarget {
    pub controller: ControllerId,
    pub transport: TransportConfig,
}

/// Network-level parameters for presence checks and uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    pub ping_repeat: u32,
    pub ping_timeout: Duration,
    pub timeout: Duration,
    pub bootloader: bool,
}

impl From<&SessionConfig> for FlashOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            ping_repeat: config.ping_repeat,
            ping_timeout: config.ping_timeout(),
            timeout: config.upload_timeout(),
            bootloader: config.bootloader,
        }
    }
}

/// Externally supplied device-presence check and firmware transfer
///
/// Both calls receive the session's open bus handle; implementations that
/// drive the bus themselves must not keep it beyond the call or stream.
#[async_trait]
pub trait FlashPrimitive: Send + Sync {
    /// `Ok(false)` when no device answers
    async fn ping(
        &self,
        bus: &mut dyn CanBus,
        target: &FlashTarget,
        options: &FlashOptions,
    ) -> Result<bool, MicError>;

    /// Start an upload and return its element stream
    async fn upload<'a>(
        &'a self,
        bus: &'a mut dyn CanBus,
        target: &FlashTarget,
        firmware: &Path,
        options: &FlashOptions,
    ) -> Result<BoxStream<'a, FlashStep>, MicError>;
}

/// Reject image paths that do not name a file
pub(crate) fn check_firmware(path: &Path) -> Result<PathBuf, MicError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(MicError::FirmwareNotFound(path.to_path_buf()))
    }
}
