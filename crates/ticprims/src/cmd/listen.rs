use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ticprims_core::{CoreError, CoreFrame, Identifier, Subscriber, TicCore};
use ticprims_transport::SerialPortFactory;

use crate::cmd::ListenArgs;
use crate::exit::{tic_error, CliError, CliResult, SUCCESS};
use crate::output::{print_core_error, print_core_frame, OutputFormat};

const WAKE_INTERVAL: Duration = Duration::from_millis(100);

enum Received {
    Frame(CoreFrame),
    Error(CoreError),
}

/// Hands events over to the printing thread.
struct Forwarder {
    sender: Mutex<Sender<Received>>,
}

impl Subscriber for Forwarder {
    fn on_data(&self, frame: CoreFrame) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(Received::Frame(frame));
        }
    }

    fn on_error(&self, error: CoreError) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(Received::Error(error));
        }
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let filter = filter(&args)?;
    let config = args.stream.core_config()?;
    let core = TicCore::new(
        Arc::new(args.stream.discovery.finder()),
        Arc::new(SerialPortFactory),
        config,
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (sender, received) = mpsc::channel();
    let forwarder: Arc<dyn Subscriber> = Arc::new(Forwarder {
        sender: Mutex::new(sender),
    });
    core.subscribe(Arc::clone(&forwarder))
        .map_err(|err| tic_error("subscribe failed", err))?;
    core.start()
        .map_err(|err| tic_error("failed to start TIC core", err))?;

    let wanted = |identifier: &Identifier| filter.as_ref().is_none_or(|f| f.matches(identifier));
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        match received.recv_timeout(WAKE_INTERVAL) {
            Ok(Received::Frame(frame)) if wanted(&frame.identifier) => {
                print_core_frame(&frame, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Ok(Received::Error(error)) if wanted(&error.identifier) => {
                print_core_error(&error, format);
            }
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    core.unsubscribe(&forwarder);
    core.stop();
    Ok(SUCCESS)
}

fn filter(args: &ListenArgs) -> CliResult<Option<Identifier>> {
    if args.port.is_none() && args.serial.is_none() {
        return Ok(None);
    }
    let target = crate::cmd::TargetArgs {
        port: args.port.clone(),
        serial: args.serial.clone(),
    };
    target.identifier().map(Some)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
