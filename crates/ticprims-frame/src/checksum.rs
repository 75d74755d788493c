//! Group checksum computation.
//!
//! The checksum is the XOR of every byte in the covered range. The range
//! starts just after the group's leading LF and stops before the checksum:
//! historic groups exclude the separator preceding the checksum, standard
//! groups include it.

use crate::delimiters::{LABEL_SEPARATOR_INDEX, SP};
use crate::error::{FrameError, Result};
use crate::mode::{Mode, ModeSelection};

/// First checksummed byte: just past the leading delimiter.
pub const OFFSET_BEGIN: usize = 1;

/// Smallest group buffer that can hold LF, a label byte, separator, checksum, CR.
const MIN_GROUP_LEN: usize = 5;

/// XOR of all bytes; 0 for an empty slice.
pub fn compute_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Start of the checksum range in a group buffer.
pub fn offset_begin() -> usize {
    OFFSET_BEGIN
}

/// End (exclusive) of the checksum range in a group buffer that still holds
/// its LF and CR delimiters.
///
/// Under [`ModeSelection::Auto`] the byte following a 4-byte label decides:
/// a space selects the historic rule, anything else the standard rule.
pub fn offset_end(buffer: &[u8], mode: ModeSelection) -> Result<usize> {
    if buffer.len() < MIN_GROUP_LEN {
        return Err(FrameError::InvalidArgument(format!(
            "group buffer too short for a checksum ({} bytes, min {MIN_GROUP_LEN}): {}",
            buffer.len(),
            hex::encode(buffer)
        )));
    }

    let mode = match mode.fixed() {
        Some(mode) => mode,
        None if buffer.get(LABEL_SEPARATOR_INDEX) == Some(&SP) => Mode::Historic,
        None => Mode::Standard,
    };

    // buffer = LF ... SEP checksum CR
    let separator = buffer.len() - 3;
    Ok(match mode {
        Mode::Historic => separator,
        Mode::Standard => separator + 1,
    })
}

/// Validate a `[begin, end)` range against `buffer`.
///
/// Each failure reports its own message: negative begin, empty or inverted
/// range, range longer than the buffer, end past the last byte.
pub fn check_buffer_offsets(buffer: &[u8], begin: isize, end: isize) -> Result<()> {
    if begin < 0 {
        return Err(FrameError::InvalidArgument(format!(
            "begin offset {begin} is negative"
        )));
    }
    if begin >= end {
        return Err(FrameError::InvalidArgument(format!(
            "begin offset {begin} is not lower than end offset {end}"
        )));
    }
    if (end - begin) as usize > buffer.len() {
        return Err(FrameError::InvalidArgument(format!(
            "range {begin}..{end} exceeds buffer of {} bytes",
            buffer.len()
        )));
    }
    if end as usize >= buffer.len() {
        return Err(FrameError::InvalidArgument(format!(
            "end offset {end} is outside buffer of {} bytes",
            buffer.len()
        )));
    }
    Ok(())
}

/// Checksum of `buffer[begin..end]` after validating the offsets.
pub fn checksum_range(buffer: &[u8], begin: isize, end: isize) -> Result<u8> {
    check_buffer_offsets(buffer, begin, end)?;
    Ok(compute_checksum(&buffer[begin as usize..end as usize]))
}

/// Checksum a delimited group buffer according to `mode`.
pub fn group_checksum(buffer: &[u8], mode: Mode) -> Result<u8> {
    let end = offset_end(buffer, mode.into())?;
    checksum_range(buffer, offset_begin() as isize, end as isize)
}
