use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::event::CoreError;
use crate::identifier::Identifier;

/// Numeric reason attached to every error reported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Anything without a dedicated code: decode and transport failures.
    OtherReason,
    /// No frame arrived in time, or the mode could not be resolved.
    DataReadTimeout,
    /// The modem behind the stream was unplugged.
    StreamUnplugged,
    /// No plugged modem matches the requested identifier.
    StreamIdentifierNotFound,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::OtherReason => 1,
            ErrorCode::DataReadTimeout => 2,
            ErrorCode::StreamUnplugged => 3,
            ErrorCode::StreamIdentifierNotFound => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::OtherReason => "OTHER_REASON",
            ErrorCode::DataReadTimeout => "DATA_READ_TIMEOUT",
            ErrorCode::StreamUnplugged => "STREAM_UNPLUGGED",
            ErrorCode::StreamIdentifierNotFound => "STREAM_IDENTIFIER_NOT_FOUND",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by core operations.
#[derive(Debug, thiserror::Error)]
pub enum TicError {
    /// An identifier was built without any field.
    #[error("identifier needs at least one of port id, port name or serial number")]
    InvalidIdentifier,

    /// No registered stream matches the identifier.
    #[error("no TIC stream matches {0}")]
    IdentifierNotFound(Identifier),

    /// `read_next_frame` gave up waiting.
    #[error("no frame from {identifier} within {timeout:?}")]
    ReadTimeout {
        identifier: Identifier,
        timeout: Duration,
    },

    /// The stream reported an error while a caller was waiting on it.
    #[error("stream error: {0}")]
    Stream(CoreError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ticprims_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ticprims_frame::FrameError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl TicError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TicError::IdentifierNotFound(_) => ErrorCode::StreamIdentifierNotFound,
            TicError::ReadTimeout { .. } => ErrorCode::DataReadTimeout,
            TicError::Stream(err) => err.code,
            TicError::InvalidIdentifier
            | TicError::Transport(_)
            | TicError::Frame(_)
            | TicError::Spawn(_) => ErrorCode::OtherReason,
        }
    }
}

pub type Result<T> = std::result::Result<T, TicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::OtherReason.code(), 1);
        assert_eq!(ErrorCode::DataReadTimeout.code(), 2);
        assert_eq!(ErrorCode::StreamUnplugged.code(), 3);
        assert_eq!(ErrorCode::StreamIdentifierNotFound.code(), 4);
    }

    #[test]
    fn stream_error_keeps_its_code() {
        let identifier = Identifier::new(Some("ttyUSB0"), None, None).expect("identifier");
        let err = TicError::Stream(CoreError::new(
            identifier,
            ErrorCode::StreamUnplugged,
            "gone",
        ));
        assert_eq!(err.code(), ErrorCode::StreamUnplugged);
        assert_eq!(TicError::InvalidIdentifier.code(), ErrorCode::OtherReason);
    }

    #[test]
    fn code_serializes_as_name() {
        let json = serde_json::to_string(&ErrorCode::DataReadTimeout).expect("serialize");
        assert_eq!(json, "\"DATA_READ_TIMEOUT\"");
    }
}
