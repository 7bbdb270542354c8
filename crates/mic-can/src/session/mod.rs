//! Device sessions
//!
//! A session addresses one controller on one bus. It opens the bus on
//! `activate()` and releases it on `deactivate()` or drop.

mod device;

use std::fmt;

use serde::Serialize;

use crate::error::MicError;

pub use device::DeviceSession;

/// Largest controller id an info request can address
pub const MAX_CONTROLLER_ID: u8 = 127;

/// Address of one controller on a shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ControllerId(u8);

impl ControllerId {
    pub fn new(raw: i64) -> Result<Self, MicError> {
        u8::try_from(raw)
            .ok()
            .filter(|id| *id <= MAX_CONTROLLER_ID)
            .map(Self)
            .ok_or(MicError::InvalidControllerId(raw))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No bus handle held (initial and terminal)
    #[default]
    Closed,
    /// Bus handle open, requests allowed
    Open,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_id_range() {
        assert_eq!(ControllerId::new(0).unwrap().get(), 0);
        assert_eq!(ControllerId::new(127).unwrap().get(), 127);
        assert!(matches!(
            ControllerId::new(128),
            Err(MicError::InvalidControllerId(128))
        ));
        assert!(matches!(
            ControllerId::new(-1),
            Err(MicError::InvalidControllerId(-1))
        ));
    }
}
