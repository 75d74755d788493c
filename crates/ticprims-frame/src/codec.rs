//! Frame decoding and encoding.

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::delimiters::{CR, EOT, ETX, LF, STX};
use crate::error::{FrameError, GroupError, Result};
use crate::group::Group;
use crate::mode::Mode;

/// A decoded TIC frame: its mode and groups in transmission order.
///
/// Labels are unique: inserting a group whose label is already present
/// replaces the existing group in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    mode: Mode,
    groups: Vec<Group>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            groups: Vec::new(),
        }
    }

    /// Builder-style [`Frame::insert`].
    pub fn with_group(mut self, group: Group) -> Self {
        self.insert(group);
        self
    }

    /// Add a group, returning the group it replaced if the label was taken.
    pub fn insert(&mut self, group: Group) -> Option<Group> {
        match self.groups.iter_mut().find(|g| g.label() == group.label()) {
            Some(slot) => Some(std::mem::replace(slot, group)),
            None => {
                self.groups.push(group);
                None
            }
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Look up a group by label.
    pub fn get(&self, label: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.label() == label)
    }

    /// Value of the group with `label`, if present.
    pub fn value(&self, label: &str) -> Option<&str> {
        self.get(label).map(Group::value)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// A frame without groups is valid but carries no data.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether every group carried a matching checksum.
    pub fn is_valid(&self) -> bool {
        self.groups.iter().all(Group::is_valid)
    }

    /// Groups whose checksum did not match.
    pub fn invalid_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|g| !g.is_valid())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_frame(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Decode a complete frame (`STX ... ETX`) in the given mode.
///
/// Groups with a wrong checksum are kept and flagged invalid. Groups that
/// cannot be split into their parts make the whole frame fail; every such
/// group is reported in one [`FrameError::MalformedGroups`].
///
/// Wire format:
/// ```text
/// ┌─────┬──────────────────────────────────────────────┬─────┐
/// │ STX │ LF label SEP [datetime SEP] data SEP cs CR … │ ETX │
/// │0x02 │ one record per group                         │0x03 │
/// └─────┴──────────────────────────────────────────────┴─────┘
/// ```
pub fn decode_frame(bytes: &[u8], mode: Mode) -> Result<Frame> {
    if bytes.first() != Some(&STX) {
        return Err(FrameError::MissingBeginDelimiter);
    }
    if bytes.len() < 2 || bytes.last() != Some(&ETX) {
        return Err(FrameError::MissingEndDelimiter);
    }
    if let Some(offset) = bytes.iter().position(|b| *b == EOT) {
        return Err(FrameError::EndOfTransmission { offset });
    }

    let body = &bytes[1..bytes.len() - 1];
    let mut frame = Frame::new(mode);
    let mut errors = Vec::new();

    for (index, range) in group_ranges(body).into_iter().enumerate() {
        let decoded = range.and_then(|range| match Group::decode(&body[range], mode) {
            Ok(group) => Ok(group),
            Err(FrameError::MalformedGroup(err)) => Err(err),
            Err(other) => Err(GroupError::new(other.to_string(), &[])),
        });
        match decoded {
            Ok(group) => {
                frame.insert(group);
            }
            Err(err) => errors.push(err.at(index)),
        }
    }

    if !errors.is_empty() {
        return Err(FrameError::MalformedGroups(errors));
    }

    trace!(%mode, groups = frame.len(), "decoded frame");
    Ok(frame)
}

/// Encode a frame into the wire format.
///
/// Nothing is written to `dst` unless every group encodes.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.is_empty() {
        return Err(FrameError::NoData);
    }

    let mut body = BytesMut::new();
    for group in frame.groups() {
        group.encode(frame.mode(), &mut body)?;
    }

    dst.reserve(body.len() + 2);
    dst.put_u8(STX);
    dst.put_slice(&body);
    dst.put_u8(ETX);
    Ok(())
}

/// Split a frame body into `LF ... CR` group ranges.
///
/// A CR only closes a group when the next group's LF or the end of the body
/// follows it, so a checksum byte equal to CR stays inside its group.
fn group_ranges(body: &[u8]) -> Vec<std::result::Result<Range<usize>, GroupError>> {
    let mut ranges = Vec::new();
    let mut start = 0usize;

    while start < body.len() {
        if body[start] != LF {
            let next = body[start..]
                .iter()
                .position(|b| *b == LF)
                .map_or(body.len(), |pos| start + pos);
            ranges.push(Err(GroupError::new(
                "unexpected bytes outside a group",
                &body[start..next],
            )));
            start = next;
            continue;
        }

        let end = (start + 1..body.len())
            .find(|&i| body[i] == CR && (i + 1 == body.len() || body[i + 1] == LF));
        match end {
            Some(end) => {
                ranges.push(Ok(start..end + 1));
                start = end + 1;
            }
            None => {
                ranges.push(Err(GroupError::new("unterminated group", &body[start..])));
                break;
            }
        }
    }

    ranges
}
