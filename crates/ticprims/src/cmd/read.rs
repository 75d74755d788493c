use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ticprims_core::{ErrorCode, TicCore, TicError};
use ticprims_transport::SerialPortFactory;
use tracing::debug;

use crate::cmd::{parse_timeout, ReadArgs};
use crate::exit::{tic_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_core_frame, OutputFormat};

const DISCOVERY_POLL: Duration = Duration::from_millis(50);

pub fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    let identifier = args.target.identifier()?;
    let timeout = parse_timeout(&args.timeout)?;
    let config = args.stream.core_config()?;

    let core = TicCore::new(
        Arc::new(args.stream.discovery.finder()),
        Arc::new(SerialPortFactory),
        config,
    );
    core.start()
        .map_err(|err| tic_error("failed to start TIC core", err))?;

    let deadline = Instant::now() + timeout;
    while !core
        .available_tics()
        .iter()
        .any(|known| known.matches(&identifier))
    {
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("no modem matching {identifier} within {timeout:?}"),
            ));
        }
        thread::sleep(DISCOVERY_POLL);
    }

    // Mode probes report read timeouts; keep waiting until the deadline.
    let frame = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match core.read_next_frame(&identifier, Some(remaining)) {
            Ok(frame) => break frame,
            Err(TicError::Stream(err))
                if err.code == ErrorCode::DataReadTimeout && Instant::now() < deadline =>
            {
                debug!(identifier = %identifier, message = %err.message, "still waiting for a frame");
            }
            Err(err) => return Err(tic_error("read failed", err)),
        }
    };

    print_core_frame(&frame, format);
    core.stop();
    Ok(SUCCESS)
}
