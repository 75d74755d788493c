//! Values handed to subscribers.

use std::fmt;
use std::time::SystemTime;

use ticprims_frame::{Frame, Mode};

use crate::error::ErrorCode;
use crate::identifier::Identifier;

/// A frame decoded from one modem.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreFrame {
    pub identifier: Identifier,
    pub mode: Mode,
    pub capture_time: SystemTime,
    pub frame: Frame,
}

/// A failure reported by one modem's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreError {
    pub identifier: Identifier,
    pub code: ErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(identifier: Identifier, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            identifier,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.identifier, self.code, self.message)
    }
}

impl std::error::Error for CoreError {}

/// What a stream publishes.
#[derive(Debug, Clone)]
pub(crate) enum Event {
    Data(CoreFrame),
    Error(CoreError),
}
