use std::io::Read;
use std::path::Path;

use ticprims_frame::delimiters::{ETX, STX};
use ticprims_frame::{decode_frame, find_mode_from_frame_buffer};
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args.path)?;
    let bytes = if args.hex {
        parse_hex(&input)?
    } else {
        input
    };

    let frame_bytes = extract_frame(&bytes);
    let mode = match args.mode.fixed() {
        Some(mode) => mode,
        None => find_mode_from_frame_buffer(frame_bytes)
            .map_err(|err| frame_error("mode detection failed", err))?
            .ok_or_else(|| CliError::new(DATA_INVALID, "unable to detect TIC mode"))?,
    };
    debug!(%mode, len = frame_bytes.len(), "decoding frame");

    let frame = decode_frame(frame_bytes, mode).map_err(|err| frame_error("decode failed", err))?;
    print_frame(&frame, None, None, format);

    if args.strict && !frame.is_valid() {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "{} group(s) with bad checksum",
                frame.invalid_groups().count()
            ),
        ));
    }
    Ok(SUCCESS)
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("failed to read stdin", err))?;
        return Ok(buf);
    }
    std::fs::read(path).map_err(|err| io_error(&format!("failed to read {}", path.display()), err))
}

fn parse_hex(input: &[u8]) -> CliResult<Vec<u8>> {
    let digits = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect::<Vec<_>>();
    hex::decode(digits).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))
}

/// The first `STX ... ETX` span of a capture, or the whole input if it has
/// no STX.
fn extract_frame(bytes: &[u8]) -> &[u8] {
    let Some(start) = bytes.iter().position(|b| *b == STX) else {
        return bytes;
    };
    let end = bytes[start..]
        .iter()
        .position(|b| *b == ETX)
        .map_or(bytes.len(), |offset| start + offset + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_frame_trims_capture_noise() {
        assert_eq!(extract_frame(b"xx\x02abc\x03\r\n"), b"\x02abc\x03");
        assert_eq!(extract_frame(b"\x02abc"), b"\x02abc");
        assert_eq!(extract_frame(b"none"), b"none");
    }

    #[test]
    fn parse_hex_ignores_whitespace() {
        assert_eq!(parse_hex(b"02 0a\n41").unwrap(), vec![0x02, 0x0a, 0x41]);
        assert_eq!(parse_hex(b"0g").unwrap_err().code, DATA_INVALID);
    }
}
