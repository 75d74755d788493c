//! Wire delimiters and mode markers.
//!
//! A frame is `STX group* ETX`; a group is `LF label SEP [datetime SEP] data SEP checksum CR`.
//! The separator is a space in historic mode and a horizontal tab in
//! standard mode.

/// Start of frame.
pub const STX: u8 = 0x02;

/// End of frame.
pub const ETX: u8 = 0x03;

/// End of transmission. Anywhere inside a frame it invalidates the frame.
pub const EOT: u8 = 0x04;

/// Start of group.
pub const LF: u8 = 0x0A;

/// End of group.
pub const CR: u8 = 0x0D;

/// Historic field separator (space).
pub const SP: u8 = 0x20;

/// Standard field separator (horizontal tab).
pub const HT: u8 = 0x09;

/// Length of a mode marker: STX, LF and a 4-byte label.
pub const MARKER_LEN: usize = 6;

/// First bytes of every historic frame (`ADCO` group first).
pub const HISTORIC_MARKER: [u8; MARKER_LEN] = [STX, LF, b'A', b'D', b'C', b'O'];

/// First bytes of every standard frame (`ADSC` group first).
pub const STANDARD_MARKER: [u8; MARKER_LEN] = [STX, LF, b'A', b'D', b'S', b'C'];

/// Index of the separator following a 4-byte label in a group buffer.
pub const LABEL_SEPARATOR_INDEX: usize = 5;

/// Returns a printable name for a delimiter byte, for diagnostics.
pub fn delimiter_name(byte: u8) -> &'static str {
    match byte {
        STX => "STX",
        ETX => "ETX",
        EOT => "EOT",
        LF => "LF",
        CR => "CR",
        SP => "SP",
        HT => "HT",
        _ => "DATA",
    }
}

/// Returns true if the byte is one of the frame or group delimiters.
pub fn is_delimiter(byte: u8) -> bool {
    matches!(byte, STX | ETX | EOT | LF | CR)
}

/// Returns true if the byte is a field separator in either mode.
pub fn is_separator(byte: u8) -> bool {
    byte == SP || byte == HT
}
