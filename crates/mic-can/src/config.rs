//! Configuration for MIC sessions
//!
//! Transport selection is derived from the host platform and is not part of
//! the configuration file. The file only carries session timing and the
//! external flashing tool bridge.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MicError;

// =============================================================================
// Transport Configuration
// =============================================================================

/// CAN interface driver family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// PEAK-System PCAN adapters (Windows)
    Pcan,
    /// Linux SocketCAN
    SocketCan,
}

impl InterfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcan => "pcan",
            Self::SocketCan => "socketcan",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface and channel of the bus the controller lives on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub interface: InterfaceKind,
    pub channel: String,
}

impl TransportConfig {
    pub fn new(interface: InterfaceKind, channel: impl Into<String>) -> Self {
        Self {
            interface,
            channel: channel.into(),
        }
    }

    /// Transport for the platform this process runs on
    pub fn for_host() -> Result<Self, MicError> {
        Self::for_os(std::env::consts::OS)
    }

    /// Transport for a platform name as reported by `std::env::consts::OS`
    pub fn for_os(os: &str) -> Result<Self, MicError> {
        match os {
            "windows" => Ok(Self::new(InterfaceKind::Pcan, "PCAN_USBBUS1")),
            "linux" => Ok(Self::new(InterfaceKind::SocketCan, "can0")),
            other => Err(MicError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.interface, self.channel)
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub flasher: FlasherConfig,
}

impl MicConfig {
    pub fn from_toml(content: &str) -> Result<Self, MicError> {
        toml::from_str(content).map_err(|e| MicError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MicError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| MicError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }
}

/// Session timing and flashing-tool parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Receive window for the telemetry reply
    #[serde(default = "default_info_timeout_ms")]
    pub info_timeout_ms: u64,
    /// Device presence attempts before giving up
    #[serde(default = "default_ping_repeat")]
    pub ping_repeat: u32,
    /// Timeout of a single presence check
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    /// Per-call timeout handed to the flashing tool
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
    /// Target is already running its bootloader
    #[serde(default)]
    pub bootloader: bool,
}

fn default_info_timeout_ms() -> u64 {
    5000
}

fn default_ping_repeat() -> u32 {
    3
}

fn default_ping_timeout_ms() -> u64 {
    5000
}

fn default_upload_timeout_ms() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            info_timeout_ms: default_info_timeout_ms(),
            ping_repeat: default_ping_repeat(),
            ping_timeout_ms: default_ping_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
            bootloader: false,
        }
    }
}

impl SessionConfig {
    pub fn info_timeout(&self) -> Duration {
        Duration::from_millis(self.info_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

/// External flashing tool invocation
///
/// Argument templates may contain `{id}`, `{interface}`, `{channel}`,
/// `{firmware}`, `{timeout}`, `{ping_repeat}` and `{bootloader}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlasherConfig {
    /// Executable to run; no flashing tool is available when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default)]
    pub ping_args: Vec<String>,
    #[serde(default)]
    pub upload_args: Vec<String>,
}
