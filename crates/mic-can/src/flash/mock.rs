//! Scripted flashing primitive for testing

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use super::{FlashOptions, FlashPrimitive, FlashStep, FlashTarget};
use crate::error::MicError;
use crate::transport::CanBus;

/// Flashing primitive that answers pings and uploads from a script
pub struct ScriptedFlasher {
    present: bool,
    steps: Vec<FlashStep>,
    pings: Mutex<Vec<FlashTarget>>,
    uploads: Mutex<Vec<PathBuf>>,
}

impl ScriptedFlasher {
    /// A device that answers pings and replays `steps` on upload
    pub fn new(steps: Vec<FlashStep>) -> Self {
        Self {
            present: true,
            steps,
            pings: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// A device that never answers
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(Vec::new())
        }
    }

    /// Targets pinged so far
    pub fn pings(&self) -> Vec<FlashTarget> {
        self.pings.lock().clone()
    }

    /// Images uploaded so far
    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl FlashPrimitive for ScriptedFlasher {
    async fn ping(
        &self,
        _bus: &mut dyn CanBus,
        target: &FlashTarget,
        _options: &FlashOptions,
    ) -> Result<bool, MicError> {
        self.pings.lock().push(target.clone());
        Ok(self.present)
    }

    async fn upload<'a>(
        &'a self,
        _bus: &'a mut dyn CanBus,
        _target: &FlashTarget,
        firmware: &Path,
        _options: &FlashOptions,
    ) -> Result<BoxStream<'a, FlashStep>, MicError> {
        self.uploads.lock().push(firmware.to_path_buf());
        Ok(stream::iter(self.steps.clone()).boxed())
    }
}
