use std::fmt;
use std::io;

use ticprims_core::{ErrorCode, TicError};
use ticprims_frame::FrameError;
use ticprims_transport::TransportError;

// Exit code constants aligned with sysexits / timeout(1) conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::Interrupted => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn tic_error(context: &str, err: TicError) -> CliError {
    match err {
        TicError::Transport(err) => transport_error(context, err),
        TicError::Frame(err) => frame_error(context, err),
        TicError::InvalidIdentifier => CliError::new(USAGE, format!("{context}: {err}")),
        TicError::Spawn(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => {
            let code = match other.code() {
                ErrorCode::DataReadTimeout => TIMEOUT,
                ErrorCode::StreamUnplugged => TRANSPORT_ERROR,
                ErrorCode::StreamIdentifierNotFound | ErrorCode::OtherReason => FAILURE,
            };
            CliError::new(code, format!("{context}: {other}"))
        }
    }
}
