//! Information groups: one label, value and checksum line of a frame.

use bytes::{BufMut, BytesMut};

use crate::checksum::{compute_checksum, group_checksum};
use crate::delimiters::{delimiter_name, is_delimiter, is_separator, CR, EOT, LF};
use crate::error::{FrameError, GroupError, Result};
use crate::mode::Mode;

/// Smallest group on the wire: LF, label byte, SEP, SEP, checksum, CR.
const MIN_GROUP_LEN: usize = 6;

/// One `label / [datetime] / value / checksum` record of a frame.
///
/// Validity is settled when the group is built: decoded groups compare the
/// checksum carried on the wire with the recomputed one, groups built with
/// [`Group::new`] compute their own checksum and are always valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    label: String,
    timestamp: Option<String>,
    value: String,
    checksum: u8,
    valid: bool,
}

impl Group {
    /// Build a valid group for `mode`.
    pub fn new(mode: Mode, label: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::build(mode, label.into(), None, value.into())
    }

    /// Build a valid standard-mode group carrying a datetime field
    /// (e.g. `E230101120000` for winter time, `H` prefix for summer time).
    pub fn with_timestamp(
        label: impl Into<String>,
        timestamp: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        Self::build(
            Mode::Standard,
            label.into(),
            Some(timestamp.into()),
            value.into(),
        )
    }

    fn build(mode: Mode, label: String, timestamp: Option<String>, value: String) -> Result<Self> {
        check_field(mode, "label", &label, false)?;
        if let Some(timestamp) = &timestamp {
            check_field(mode, "timestamp", timestamp, false)?;
        }
        check_field(mode, "value", &value, true)?;

        let checksum = compute_checksum(&covered_bytes(
            mode,
            &label,
            timestamp.as_deref(),
            &value,
        ));
        if checksum == EOT {
            return Err(FrameError::InvalidArgument(format!(
                "checksum of group {label:?} is EOT and cannot be framed"
            )));
        }
        Ok(Self {
            label,
            timestamp,
            value,
            checksum,
            valid: true,
        })
    }

    /// Decode one delimited group buffer (`LF ... CR`).
    ///
    /// A checksum mismatch is not an error: the group is returned with
    /// [`Group::is_valid`] set to false. Structural problems are.
    pub fn decode(buffer: &[u8], mode: Mode) -> Result<Self> {
        let malformed = |reason: &str| FrameError::MalformedGroup(GroupError::new(reason, buffer));

        if buffer.len() < MIN_GROUP_LEN {
            return Err(malformed("group too short"));
        }
        if buffer[0] != LF {
            return Err(malformed(&format!(
                "group starts with {} instead of LF",
                delimiter_name(buffer[0])
            )));
        }
        let last = buffer[buffer.len() - 1];
        if last != CR {
            return Err(malformed(&format!(
                "group ends with {} instead of CR",
                delimiter_name(last)
            )));
        }

        let separator = mode.separator();
        let content = &buffer[1..buffer.len() - 1];
        let checksum = content[content.len() - 1];
        let before_checksum = content[content.len() - 2];
        if before_checksum != separator {
            if is_separator(before_checksum) {
                return Err(malformed(&format!(
                    "{} before checksum, {mode} mode separates with {}",
                    delimiter_name(before_checksum),
                    delimiter_name(separator)
                )));
            }
            return Err(malformed("checksum part is not a single byte"));
        }

        let body = &content[..content.len() - 2];
        let parts = body.split(|b| *b == separator).collect::<Vec<_>>();
        let (label, timestamp, value) = match (mode, parts.as_slice()) {
            (_, [label, value]) => (*label, None, *value),
            (Mode::Standard, [label, timestamp, value]) => (*label, Some(*timestamp), *value),
            (Mode::Historic, _) => return Err(malformed("expected label, data and checksum")),
            (Mode::Standard, _) => {
                return Err(malformed(
                    "expected label, [datetime,] data and checksum",
                ))
            }
        };

        if label.is_empty() {
            return Err(malformed("empty label"));
        }

        let text = |part: &[u8]| {
            std::str::from_utf8(part)
                .map(str::to_string)
                .map_err(|_| malformed("group is not valid ASCII"))
        };
        let label = text(label)?;
        let timestamp = timestamp.map(text).transpose()?;
        let value = text(value)?;

        let valid = group_checksum(buffer, mode)? == checksum;

        Ok(Self {
            label,
            timestamp,
            value,
            checksum,
            valid,
        })
    }

    /// Append the wire form of this group to `dst`.
    ///
    /// Fails if the stored checksum does not match the checksum recomputed
    /// for `mode`, which is the case for invalid decoded groups and for
    /// groups built for the other mode.
    pub fn encode(&self, mode: Mode, dst: &mut BytesMut) -> Result<()> {
        let covered = covered_bytes(mode, &self.label, self.timestamp.as_deref(), &self.value);
        let computed = compute_checksum(&covered);
        if computed != self.checksum {
            return Err(FrameError::ChecksumMismatch {
                label: self.label.clone(),
                stored: self.checksum,
                computed,
            });
        }

        dst.reserve(covered.len() + 4);
        dst.put_u8(LF);
        dst.put_slice(&covered);
        if mode == Mode::Historic {
            dst.put_u8(mode.separator());
        }
        dst.put_u8(self.checksum);
        dst.put_u8(CR);
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Datetime field of a standard 4-part group.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Checksum byte carried by (or computed for) this group.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Whether the carried checksum matched when the group was built.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Bytes covered by the checksum: label SEP [timestamp SEP] value, plus the
/// trailing SEP in standard mode.
fn covered_bytes(mode: Mode, label: &str, timestamp: Option<&str>, value: &str) -> Vec<u8> {
    let separator = mode.separator();
    let mut out = Vec::with_capacity(label.len() + value.len() + 24);
    out.extend_from_slice(label.as_bytes());
    out.push(separator);
    if let Some(timestamp) = timestamp {
        out.extend_from_slice(timestamp.as_bytes());
        out.push(separator);
    }
    out.extend_from_slice(value.as_bytes());
    if mode == Mode::Standard {
        out.push(separator);
    }
    out
}

fn check_field(mode: Mode, name: &str, field: &str, allow_empty: bool) -> Result<()> {
    if !allow_empty && field.is_empty() {
        return Err(FrameError::InvalidArgument(format!("{name} must not be empty")));
    }
    if !field.is_ascii() {
        return Err(FrameError::InvalidArgument(format!(
            "{name} {field:?} is not ASCII"
        )));
    }
    if field
        .bytes()
        .any(|b| b == mode.separator() || is_delimiter(b))
    {
        return Err(FrameError::InvalidArgument(format!(
            "{name} {field:?} contains a {mode} separator or delimiter"
        )));
    }
    Ok(())
}
