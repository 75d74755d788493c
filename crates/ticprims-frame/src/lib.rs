//! TIC frame handling: checksums, mode detection, the frame codec and
//! frame extraction from serial streams.
//!
//! A frame is `STX group* ETX`; each group is `LF label SEP [datetime SEP]
//! value SEP checksum CR`. Historic meters separate fields with a space,
//! standard (Linky) meters with a tab.

pub mod checksum;
pub mod codec;
pub mod delimiters;
pub mod detecting;
pub mod detector;
pub mod error;
pub mod group;
pub mod mode;
pub mod reader;

pub use checksum::{check_buffer_offsets, checksum_range, compute_checksum, offset_begin, offset_end};
pub use codec::{decode_frame, encode_frame, Frame};
pub use detecting::ModeDetectingStream;
pub use detector::{find_mode_from_frame_buffer, find_mode_from_group_buffer};
pub use error::{FrameError, GroupError, Result};
pub use group::Group;
pub use mode::{Mode, ModeSelection};
pub use reader::{ReaderConfig, StreamReader, DEFAULT_MAX_FRAME_SIZE, DEFAULT_POLL_INTERVAL};
