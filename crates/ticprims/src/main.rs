mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ticprims", version, about = "TIC electricity meter reader")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). TICPRIMS_LOG overrides it.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_subcommand() {
        let cli = Cli::try_parse_from([
            "ticprims",
            "read",
            "--port",
            "/dev/ttyUSB0",
            "--mode",
            "standard",
            "--timeout",
            "5s",
        ])
        .expect("read args should parse");

        assert!(matches!(cli.command, Command::Read(_)));
    }

    #[test]
    fn read_requires_a_target() {
        let err = Cli::try_parse_from(["ticprims", "read"]).expect_err("target is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = Cli::try_parse_from(["ticprims", "decode", "frame.bin", "--mode", "fast"])
            .expect_err("unknown mode should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_listen_with_count() {
        let cli = Cli::try_parse_from(["ticprims", "listen", "--count", "3", "--all-ports"])
            .expect("listen args should parse");
        match cli.command {
            Command::Listen(args) => {
                assert_eq!(args.count, Some(3));
                assert!(args.stream.discovery.all_ports);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
