//! Protocol variant detection from raw bytes.

use crate::delimiters::{HISTORIC_MARKER, HT, LABEL_SEPARATOR_INDEX, MARKER_LEN, SP, STANDARD_MARKER};
use crate::error::{FrameError, Result};
use crate::mode::Mode;

/// Detect the mode of a complete frame from its first six bytes.
///
/// Returns `Ok(None)` when the frame starts with neither the historic
/// (`ADCO`) nor the standard (`ADSC`) leading group.
pub fn find_mode_from_frame_buffer(bytes: &[u8]) -> Result<Option<Mode>> {
    if bytes.len() < MARKER_LEN {
        return Err(FrameError::InvalidArgument(format!(
            "frame buffer too short to detect mode ({} bytes, need {MARKER_LEN}): [{}]",
            bytes.len(),
            hex::encode(bytes)
        )));
    }

    let head = &bytes[..MARKER_LEN];
    if head == HISTORIC_MARKER {
        Ok(Some(Mode::Historic))
    } else if head == STANDARD_MARKER {
        Ok(Some(Mode::Standard))
    } else {
        Ok(None)
    }
}

/// Detect the mode of a single group (`LF label SEP ...`) from the separator
/// after a 4-byte label.
pub fn find_mode_from_group_buffer(bytes: &[u8]) -> Result<Option<Mode>> {
    Ok(match bytes.get(LABEL_SEPARATOR_INDEX) {
        Some(&SP) => Some(Mode::Historic),
        Some(&HT) => Some(Mode::Standard),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_standard_marker() {
        let bytes = [0x02, 0x0A, b'A', b'D', b'S', b'C', b'\t'];
        assert_eq!(find_mode_from_frame_buffer(&bytes).unwrap(), Some(Mode::Standard));
    }

    #[test]
    fn frame_historic_marker() {
        let bytes = [0x02, 0x0A, b'A', b'D', b'C', b'O'];
        assert_eq!(find_mode_from_frame_buffer(&bytes).unwrap(), Some(Mode::Historic));
    }

    #[test]
    fn frame_unknown_label() {
        let bytes = [0x02, 0x0A, b'P', b'T', b'E', b'C', b' '];
        assert_eq!(find_mode_from_frame_buffer(&bytes).unwrap(), None);
    }

    #[test]
    fn frame_without_stx_is_unknown() {
        let bytes = [0x0A, 0x0A, b'A', b'D', b'C', b'O'];
        assert_eq!(find_mode_from_frame_buffer(&bytes).unwrap(), None);
    }

    #[test]
    fn frame_too_short_reports_hex() {
        let err = find_mode_from_frame_buffer(&[0x02, 0x0A, b'A']).unwrap_err();
        match err {
            FrameError::InvalidArgument(message) => assert!(message.contains("020a41")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn group_separators() {
        assert_eq!(
            find_mode_from_group_buffer(b"\nADCO 031664001115 +\r").unwrap(),
            Some(Mode::Historic)
        );
        assert_eq!(
            find_mode_from_group_buffer(b"\nADSC\t041876097431\tX\r").unwrap(),
            Some(Mode::Standard)
        );
        assert_eq!(find_mode_from_group_buffer(b"\nIINST 002 Y\r").unwrap(), None);
        assert_eq!(find_mode_from_group_buffer(b"\nAD").unwrap(), None);
    }
}
