//! Device information request and reply decoding
//!
//! The controller answers an info request (`0x800 + id`, seven zero bytes)
//! with a run of `0x500` data frames followed by a single `0x700` frame that
//! marks the end of the reply. The concatenated payload has a fixed layout:
//!
//! ```text
//! offset  0..2   (unused)
//!         2      firmware major
//!         3      firmware minor
//!         4..8   hardware name, first half (ASCII)
//!         8      separator
//!         9..13  hardware name, second half (ASCII)
//!        13      separator
//!        14..16  unique id, part 1
//!        16      separator
//!        17..24  unique id, part 2
//!        24      separator
//!        25..28  unique id, part 3
//!        29      firmware stability
//! ```
//!
//! Replies shorter than [`MIN_PAYLOAD_LEN`] bytes are rejected.

use std::fmt;
use std::ops::Range;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::MicError;
use crate::session::ControllerId;
use crate::transport::{CanBus, CanFilter, CanFrame};

/// Base arbitration id of the info request; the controller id is added to it
pub const INFO_REQUEST_BASE: u32 = 0x800;
/// Arbitration id of reply data frames
pub const INFO_DATA_ID: u32 = 0x500;
/// Arbitration id of the end-of-reply frame
pub const INFO_END_ID: u32 = 0x700;
/// Mask the reply filters compare under
pub const INFO_FILTER_MASK: u32 = 0x7FF;
/// Length of the info request payload
pub const INFO_REQUEST_LEN: usize = 7;
/// Shortest decodable reply
pub const MIN_PAYLOAD_LEN: usize = 56;

mod offset {
    use std::ops::Range;

    pub const FW_MAJOR: usize = 2;
    pub const FW_MINOR: usize = 3;
    pub const HW_NAME: [Range<usize>; 2] = [4..8, 9..13];
    pub const UUID: [Range<usize>; 3] = [14..16, 17..24, 25..28];
    pub const FW_STATUS: usize = 29;
}

/// Firmware release channel reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FirmwareStability {
    Stable,
    Beta,
    Alpha,
    Unknown,
}

impl From<u8> for FirmwareStability {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Stable,
            0x01 => Self::Beta,
            0x02 => Self::Alpha,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FirmwareStability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stable => "STABLE",
            Self::Beta => "BETA",
            Self::Alpha => "ALPHA",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Firmware version, rendered as `v{major}.{minor:02}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{:02}", self.major, self.minor)
    }
}

impl Serialize for FirmwareVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decoded device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    pub firmware_version: FirmwareVersion,
    pub fw_status: FirmwareStability,
    pub hardware_name: String,
    #[serde(serialize_with = "serialize_hex_pairs")]
    pub unique_id: Vec<u8>,
}

impl TelemetryRecord {
    /// Unique id as uppercase, space-separated hex pairs
    pub fn unique_id_hex(&self) -> String {
        hex_pairs(&self.unique_id)
    }
}

fn hex_pairs(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

fn serialize_hex_pairs<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex_pairs(bytes))
}

/// Build the info request for a controller
pub fn info_request(controller: ControllerId) -> Result<CanFrame, MicError> {
    let id = INFO_REQUEST_BASE + u32::from(controller.get());
    Ok(CanFrame::extended(id, &[0u8; INFO_REQUEST_LEN])?)
}

/// Filters that deliver only reply frames
pub fn reply_filters() -> [CanFilter; 2] {
    [
        CanFilter::extended(INFO_DATA_ID, INFO_FILTER_MASK),
        CanFilter::extended(INFO_END_ID, INFO_FILTER_MASK),
    ]
}

/// What the reassembler wants after consuming a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyProgress {
    /// Keep receiving
    Pending,
    /// End-of-reply seen; stop receiving
    Complete,
}

/// Accumulates reply payload in arrival order
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
    complete: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: &CanFrame) -> ReplyProgress {
        if self.complete {
            return ReplyProgress::Complete;
        }

        match frame.id() & INFO_FILTER_MASK {
            INFO_DATA_ID => self.buffer.extend_from_slice(frame.data()),
            INFO_END_ID => self.complete = true,
            other => debug!(can_id = %format_args!("0x{:X}", other), "Ignoring unexpected frame"),
        }

        if self.complete {
            ReplyProgress::Complete
        } else {
            ReplyProgress::Pending
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// Receive reply frames until the end marker arrives or `timeout` elapses.
///
/// A timeout is not an error; whatever was accumulated is returned.
pub async fn collect_reply(bus: &mut dyn CanBus, timeout: Duration) -> Result<Vec<u8>, MicError> {
    let filters = reply_filters();
    let deadline = Instant::now() + timeout;
    let mut reassembler = Reassembler::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match bus.receive(remaining, &filters).await? {
            Some(frame) => {
                if reassembler.push(&frame) == ReplyProgress::Complete {
                    break;
                }
            }
            None => break,
        }
    }

    if !reassembler.is_complete() {
        warn!(
            bytes = reassembler.buffer().len(),
            "Telemetry reply timed out before end marker"
        );
    }
    Ok(reassembler.into_buffer())
}

/// Decode a reassembled reply
pub fn decode(payload: &[u8]) -> Result<TelemetryRecord, MicError> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(MicError::MalformedPayload {
            reason: format!(
                "reply is {} bytes, at least {} required",
                payload.len(),
                MIN_PAYLOAD_LEN
            ),
        });
    }

    let hardware_name = concat(payload, &offset::HW_NAME)
        .into_iter()
        .map(char::from)
        .collect();

    Ok(TelemetryRecord {
        firmware_version: FirmwareVersion {
            major: payload[offset::FW_MAJOR],
            minor: payload[offset::FW_MINOR],
        },
        fw_status: FirmwareStability::from(payload[offset::FW_STATUS]),
        hardware_name,
        unique_id: concat(payload, &offset::UUID),
    })
}

fn concat(payload: &[u8], ranges: &[Range<usize>]) -> Vec<u8> {
    ranges
        .iter()
        .flat_map(|r| payload[r.clone()].iter().copied())
        .collect()
}
