use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use ticprims_core::{CoreConfig, Identifier};
use ticprims_frame::ModeSelection;
use ticprims_transport::SerialPortFinder;

use crate::exit::{tic_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod list;
pub mod listen;
pub mod read;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List plugged TIC modems.
    List(ListArgs),
    /// Print the next frame from one modem.
    Read(ReadArgs),
    /// Print frames from every modem until interrupted.
    Listen(ListenArgs),
    /// Decode a captured frame from a file.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::List(args) => list::run(args, format),
        Command::Read(args) => read::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Port discovery flags shared by commands that enumerate modems.
#[derive(Args, Debug, Clone)]
pub struct DiscoveryArgs {
    /// Also report serial ports that are not USB devices.
    #[arg(long, env = "TICPRIMS_ALL_PORTS")]
    pub all_ports: bool,
}

impl DiscoveryArgs {
    pub fn finder(&self) -> SerialPortFinder {
        let finder = SerialPortFinder::new();
        if self.all_ports {
            finder.include_non_usb()
        } else {
            finder
        }
    }
}

/// Stream settings shared by commands that read from modems.
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// TIC mode: historic, standard or auto.
    #[arg(long, default_value = "auto", env = "TICPRIMS_MODE")]
    pub mode: ModeSelection,
    /// Force a baud rate instead of the mode's own.
    #[arg(long, env = "TICPRIMS_BAUD_RATE")]
    pub baud_rate: Option<u32>,
    /// Time allowed for one frame (e.g. 10s, 500ms; 0 waits forever).
    #[arg(long, default_value = "10s", env = "TICPRIMS_READ_TIMEOUT")]
    pub read_timeout: String,
    /// Period between two scans for plugged modems.
    #[arg(long, default_value = "1s", env = "TICPRIMS_POLL_INTERVAL")]
    pub poll_interval: String,
    /// Pause after a failed read before a modem is read again.
    #[arg(long, default_value = "1s", env = "TICPRIMS_RETRY_INTERVAL")]
    pub retry_interval: String,
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

impl StreamArgs {
    pub fn core_config(&self) -> CliResult<CoreConfig> {
        let read_timeout = match self.read_timeout.trim() {
            "0" | "0s" | "0ms" => None,
            other => Some(parse_timeout(other)?),
        };
        let mut config = CoreConfig::default()
            .with_mode(self.mode)
            .with_read_timeout(read_timeout)
            .with_poll_interval(parse_timeout(&self.poll_interval)?)
            .with_retry_interval(parse_timeout(&self.retry_interval)?);
        if let Some(baud_rate) = self.baud_rate {
            config = config.with_baud_rate(baud_rate);
        }
        Ok(config)
    }
}

/// Selects one modem.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Port path or system name (e.g. /dev/ttyUSB0, ttyUSB0, COM3).
    #[arg(long, short = 'p', required_unless_present = "serial")]
    pub port: Option<String>,
    /// USB serial number of the modem.
    #[arg(long, short = 's')]
    pub serial: Option<String>,
}

impl TargetArgs {
    pub fn identifier(&self) -> CliResult<Identifier> {
        let result = match (&self.port, &self.serial) {
            (Some(port), None) => Identifier::port(port),
            (port, Some(serial)) => {
                let port = port.as_deref();
                let (port_id, port_name) = match port {
                    Some(p) if p.contains('/') || p.contains('\\') => (None, Some(p)),
                    other => (other, None),
                };
                Identifier::new(port_id, port_name, Some(serial))
            }
            (None, None) => return Err(CliError::new(USAGE, "--port or --serial is required")),
        };
        result.map_err(|err| tic_error("invalid modem selection", err))
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub stream: StreamArgs,
    /// Overall time to wait for the modem and its next frame (e.g. 30s).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub stream: StreamArgs,
    /// Only print frames from modems with this port path or name.
    #[arg(long, short = 'p')]
    pub port: Option<String>,
    /// Only print frames from the modem with this USB serial number.
    #[arg(long, short = 's')]
    pub serial: Option<String>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding the frame (`-` for stdin).
    pub path: PathBuf,
    /// Input is hex text instead of raw bytes.
    #[arg(long)]
    pub hex: bool,
    /// TIC mode: historic, standard or auto.
    #[arg(long, default_value = "auto")]
    pub mode: ModeSelection,
    /// Exit with status 60 when any group has a bad checksum.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timeout_seconds() {
        assert_eq!(parse_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_timeout_millis() {
        assert_eq!(parse_timeout("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_timeout_rejects_zero_and_garbage() {
        assert_eq!(parse_timeout("0").unwrap_err().code, USAGE);
        assert_eq!(parse_timeout("").unwrap_err().code, USAGE);
        assert_eq!(parse_timeout("soon").unwrap_err().code, USAGE);
    }

    fn stream_args(read_timeout: &str) -> StreamArgs {
        StreamArgs {
            mode: ModeSelection::Standard,
            baud_rate: Some(19200),
            read_timeout: read_timeout.to_string(),
            poll_interval: "250ms".to_string(),
            retry_interval: "2s".to_string(),
            discovery: DiscoveryArgs { all_ports: false },
        }
    }

    #[test]
    fn stream_args_build_core_config() {
        let config = stream_args("3s").core_config().unwrap();
        assert_eq!(config.mode, ModeSelection::Standard);
        assert_eq!(config.baud_rate, Some(19200));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.retry_interval, Duration::from_secs(2));

        assert_eq!(stream_args("0").core_config().unwrap().read_timeout, None);
    }

    #[test]
    fn target_identifier_from_path_and_serial() {
        let target = TargetArgs {
            port: Some("/dev/ttyUSB1".to_string()),
            serial: Some("A1".to_string()),
        };
        let identifier = target.identifier().unwrap();
        assert_eq!(identifier.port_name(), Some("/dev/ttyUSB1"));
        assert_eq!(identifier.serial_number(), Some("A1"));
    }
}
