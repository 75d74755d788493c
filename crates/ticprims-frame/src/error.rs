use std::fmt;

/// Errors that can occur during frame encoding/decoding and stream reads.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A caller passed a buffer, offset or mode that cannot be processed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The buffer does not start with STX.
    #[error("frame does not start with STX (0x02)")]
    MissingBeginDelimiter,

    /// The buffer does not end with ETX.
    #[error("frame does not end with ETX (0x03)")]
    MissingEndDelimiter,

    /// An EOT byte was found inside the frame.
    #[error("frame interrupted by EOT (0x04) at offset {offset}")]
    EndOfTransmission { offset: usize },

    /// A single group could not be split into its parts.
    #[error("malformed group: {0}")]
    MalformedGroup(GroupError),

    /// One or more groups of a frame could not be decoded.
    #[error("{} malformed group(s): {}", .0.len(), join(.0))]
    MalformedGroups(Vec<GroupError>),

    /// A group's stored checksum differs from its recomputed value.
    #[error("checksum mismatch for group {label:?} (stored 0x{stored:02x}, computed 0x{computed:02x})")]
    ChecksumMismatch {
        label: String,
        stored: u8,
        computed: u8,
    },

    /// Encoding was requested for a frame without groups.
    #[error("frame has no data")]
    NoData,

    /// A partial frame grew past the configured limit.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The read was interrupted by a shutdown request.
    #[error("read interrupted")]
    Interrupted,

    /// The serial transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] ticprims_transport::TransportError),
}

/// Why one group failed to decode, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupError {
    /// Position of the group within its frame (0-based), if known.
    pub index: Option<usize>,
    pub reason: String,
    /// Hex dump of the offending bytes.
    pub raw: String,
}

impl GroupError {
    pub(crate) fn new(reason: impl Into<String>, raw: &[u8]) -> Self {
        Self {
            index: None,
            reason: reason.into(),
            raw: hex::encode(raw),
        }
    }

    pub(crate) fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "group #{index}: {} [{}]", self.reason, self.raw),
            None => write!(f, "{} [{}]", self.reason, self.raw),
        }
    }
}

fn join(errors: &[GroupError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, FrameError>;
