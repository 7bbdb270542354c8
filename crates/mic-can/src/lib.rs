//! mic-can - CAN session layer for MIC motor controllers
//!
//! This crate talks to a motor controller over a CAN bus: it checks that the
//! bus can be opened, pings the controller, reads its device information and
//! drives a firmware upload through an external flashing primitive.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SessionTask                            │
//! │  Worker thread per operation, ordered event stream          │
//! │                                                             │
//! │                   ┌───────────────┐                         │
//! │                   │ DeviceSession │                         │
//! │                   │ (Closed/Open) │                         │
//! │                   └───────┬───────┘                         │
//! │          ┌────────────────┼──────────────────┐              │
//! │  ┌───────┴───────┐ ┌──────┴───────┐ ┌────────┴─────────┐    │
//! │  │ telemetry     │ │ flash        │ │ TransportProbe   │    │
//! │  │ (info codec)  │ │ (orchestrate)│ │ (open + close)   │    │
//! │  └───────┬───────┘ └──────┬───────┘ └────────┬─────────┘    │
//! │          └────────────────┼──────────────────┘              │
//! │                  ┌────────┴────────┐                        │
//! │                  │ CanBus          │                        │
//! │                  │ (SocketCAN/mock)│                        │
//! │                  └─────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod flash;
pub mod session;
pub mod task;
pub mod telemetry;
pub mod transport;

pub use config::{FlasherConfig, InterfaceKind, MicConfig, SessionConfig, TransportConfig};
pub use error::MicError;
pub use flash::{CommandFlasher, FlashPrimitive, FlashStep, UploadProgressEvent};
pub use session::{ControllerId, DeviceSession, SessionState};
pub use task::{MicContext, Operation, SessionEvent, SessionTask, SessionTaskHandle};
pub use telemetry::{FirmwareStability, FirmwareVersion, TelemetryRecord};
pub use transport::{
    probe, BusConnector, CanBus, CanFilter, CanFrame, SystemConnector, TransportError,
};
