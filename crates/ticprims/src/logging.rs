//! Diagnostics on stderr. Frames and errors go to stdout through `output`.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive that overrides
/// `--log-level`.
pub const LOG_ENV: &str = "TICPRIMS_LOG";

/// Crates whose events follow `--log-level`; everything else stays at warn.
const OWN_TARGETS: [&str; 4] = [
    "ticprims",
    "ticprims_core",
    "ticprims_frame",
    "ticprims_transport",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// One line per event, tagged with the stream thread (`tic-<port>`).
    Text,
    /// One JSON object per event.
    Json,
}

/// Verbosity of the ticprims crates. `debug` shows mode detection and
/// resets, `trace` every frame read.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    fn directives(self) -> String {
        let level = self.as_filter();
        let mut directives = vec![LevelFilter::WARN.min(level).to_string()];
        directives.extend(OWN_TARGETS.iter().map(|target| format!("{target}={level}")));
        directives.join(",")
    }
}

fn env_filter(level: LogLevel, overrides: Option<&str>) -> EnvFilter {
    overrides
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.directives()))
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let overrides = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(level, overrides.as_deref()))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
