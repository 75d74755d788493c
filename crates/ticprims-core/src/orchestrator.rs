use std::sync::mpsc::{self, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ticprims_transport::{
    PortDescriptor, PortFinder, SerialPortFactory, SerialPortFinder, TransportFactory,
};
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::device::DeviceStream;
use crate::error::{ErrorCode, Result, TicError};
use crate::event::{CoreError, CoreFrame};
use crate::identifier::Identifier;
use crate::subscriber::{same_subscriber, Route, Subscriber};

/// Modems that appeared or disappeared during one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlugChanges {
    pub plugged: Vec<Identifier>,
    pub unplugged: Vec<Identifier>,
}

impl PlugChanges {
    pub fn is_empty(&self) -> bool {
        self.plugged.is_empty() && self.unplugged.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    streams: Vec<DeviceStream>,
    /// Descriptors returned by the last successful scan.
    ports: Vec<PortDescriptor>,
    globals: Vec<Arc<dyn Subscriber>>,
}

struct Inner {
    config: CoreConfig,
    finder: Arc<dyn PortFinder>,
    factory: Arc<dyn TransportFactory>,
    registry: Mutex<Registry>,
}

struct Poller {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Entry point: tracks plugged modems, runs one [`DeviceStream`] per modem
/// and routes their frames to subscribers.
///
/// ```no_run
/// use ticprims_core::{CoreConfig, Identifier, TicCore};
///
/// let core = TicCore::with_serial_ports(CoreConfig::default());
/// core.start()?;
/// let id = Identifier::port("/dev/ttyUSB0")?;
/// let frame = core.read_next_frame(&id, None)?;
/// println!("{:?}", frame.frame.value("PAPP"));
/// # Ok::<(), ticprims_core::TicError>(())
/// ```
pub struct TicCore {
    inner: Arc<Inner>,
    poller: Mutex<Option<Poller>>,
}

impl TicCore {
    pub fn new(
        finder: Arc<dyn PortFinder>,
        factory: Arc<dyn TransportFactory>,
        config: CoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                finder,
                factory,
                registry: Mutex::new(Registry::default()),
            }),
            poller: Mutex::new(None),
        }
    }

    /// Core over the serial ports of this machine.
    pub fn with_serial_ports(config: CoreConfig) -> Self {
        Self::new(
            Arc::new(SerialPortFinder::new()),
            Arc::new(SerialPortFactory),
            config,
        )
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Scan once, then keep scanning every `poll_interval` on a background
    /// thread. Calling `start` on a running core does nothing.
    pub fn start(&self) -> Result<()> {
        let mut poller = lock(&self.poller);
        if poller.is_some() {
            return Ok(());
        }

        if self.inner.refresh().is_err() {
            debug!("initial port scan failed; polling continues");
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let interval = self.inner.config.poll_interval;
        let handle = thread::Builder::new()
            .name("tic-hotplug".to_string())
            .spawn(move || poll_loop(&inner, &stopped, interval))?;
        *poller = Some(Poller { stop, handle });
        info!(interval = ?interval, "TIC core started");
        Ok(())
    }

    /// Stop polling and every device stream. Subscriptions to globals are kept
    /// for a later `start`.
    pub fn stop(&self) {
        if let Some(poller) = lock(&self.poller).take() {
            let _ = poller.stop.send(());
            if poller.handle.join().is_err() {
                warn!("hot-plug thread panicked");
            }
        }

        let streams = std::mem::take(&mut self.inner.lock().streams);
        for stream in &streams {
            stream.stop();
            stream.detach_all();
        }
        if !streams.is_empty() {
            info!(streams = streams.len(), "TIC core stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.poller).is_some()
    }

    /// Run one scan now and apply its result.
    pub fn refresh(&self) -> Result<PlugChanges> {
        self.inner.refresh()
    }

    /// Identifiers of the modems currently plugged in.
    pub fn available_tics(&self) -> Vec<Identifier> {
        self.inner
            .lock()
            .streams
            .iter()
            .map(|stream| stream.identifier().clone())
            .collect()
    }

    /// Port details as reported by the last successful scan, including ports
    /// no stream could be opened for.
    pub fn modems_info(&self) -> Vec<PortDescriptor> {
        self.inner.lock().ports.clone()
    }

    /// Receive events from every stream, present and future.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        let mut registry = self.inner.lock();
        if registry
            .globals
            .iter()
            .any(|known| same_subscriber(known, &subscriber))
        {
            return Ok(());
        }
        for stream in &registry.streams {
            stream.attach(Route::Global, Arc::clone(&subscriber))?;
        }
        registry.globals.push(subscriber);
        Ok(())
    }

    /// Undo [`TicCore::subscribe`]. Per-identifier subscriptions stay.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        let mut registry = self.inner.lock();
        registry
            .globals
            .retain(|known| !same_subscriber(known, subscriber));
        for stream in &registry.streams {
            stream.detach(Route::Global, subscriber);
        }
    }

    /// Receive events from the first stream matching `identifier`.
    pub fn subscribe_to(&self, identifier: &Identifier, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        let registry = self.inner.lock();
        let stream = registry
            .streams
            .iter()
            .find(|stream| stream.identifier().matches(identifier))
            .ok_or_else(|| TicError::IdentifierNotFound(identifier.clone()))?;
        stream.attach(Route::Direct, subscriber)?;
        Ok(())
    }

    /// Undo [`TicCore::subscribe_to`]. Unknown identifiers are ignored.
    pub fn unsubscribe_from(&self, identifier: &Identifier, subscriber: &Arc<dyn Subscriber>) {
        let registry = self.inner.lock();
        for stream in registry
            .streams
            .iter()
            .filter(|stream| stream.identifier().matches(identifier))
        {
            stream.detach(Route::Direct, subscriber);
        }
    }

    /// Streams `subscriber` receives events from, through any subscription.
    pub fn identifiers_for(&self, subscriber: &Arc<dyn Subscriber>) -> Vec<Identifier> {
        self.inner
            .lock()
            .streams
            .iter()
            .filter(|stream| stream.has_subscriber(subscriber))
            .map(|stream| stream.identifier().clone())
            .collect()
    }

    /// Block until the stream matching `identifier` produces its next frame.
    ///
    /// An error published by the stream while waiting is returned as
    /// [`TicError::Stream`]. Without a `timeout` the configured
    /// `read_next_timeout` applies.
    pub fn read_next_frame(
        &self,
        identifier: &Identifier,
        timeout: Option<Duration>,
    ) -> Result<CoreFrame> {
        let timeout = timeout.unwrap_or(self.inner.config.read_next_timeout);
        let (sender, receiver) = mpsc::sync_channel(1);
        let waiter: Arc<dyn Subscriber> = Arc::new(NextFrame {
            slot: Mutex::new(Some(sender)),
        });

        self.subscribe_to(identifier, Arc::clone(&waiter))?;
        let outcome = receiver.recv_timeout(timeout);
        self.unsubscribe_from(identifier, &waiter);

        match outcome {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(error)) => Err(TicError::Stream(error)),
            Err(_) => Err(TicError::ReadTimeout {
                identifier: identifier.clone(),
                timeout,
            }),
        }
    }
}

impl Drop for TicCore {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    fn refresh(&self) -> Result<PlugChanges> {
        let ports = self.finder.find_all().inspect_err(|err| {
            warn!(error = %err, "port enumeration failed");
        })?;

        let found = ports
            .iter()
            .filter_map(|descriptor| match Identifier::from_descriptor(descriptor) {
                Ok(identifier) => Some((descriptor, identifier)),
                Err(_) => {
                    debug!(port = %descriptor, "skipping port without identity");
                    None
                }
            })
            .collect::<Vec<_>>();

        let mut changes = PlugChanges::default();
        let removed = {
            let mut registry = self.lock();
            let (kept, removed): (Vec<_>, Vec<_>) =
                std::mem::take(&mut registry.streams)
                    .into_iter()
                    .partition(|stream| {
                        found
                            .iter()
                            .any(|(_, identifier)| identifier == stream.identifier())
                    });
            registry.streams = kept;

            for (descriptor, identifier) in found {
                if registry
                    .streams
                    .iter()
                    .any(|stream| stream.identifier() == &identifier)
                {
                    continue;
                }
                match self.open_stream(descriptor, identifier.clone(), &registry.globals) {
                    Ok(stream) => {
                        info!(identifier = %identifier, port = %descriptor, "modem plugged");
                        registry.streams.push(stream);
                        changes.plugged.push(identifier);
                    }
                    Err(err) => {
                        warn!(port = %descriptor, error = %err, "failed to open TIC stream");
                    }
                }
            }
            registry.ports = ports;
            removed
        };

        for stream in removed {
            let identifier = stream.identifier().clone();
            info!(identifier = %identifier, "modem unplugged");
            stream.notify(ErrorCode::StreamUnplugged, "modem unplugged");
            stream.stop();
            stream.detach_all();
            changes.unplugged.push(identifier);
        }

        Ok(changes)
    }

    fn open_stream(
        &self,
        descriptor: &PortDescriptor,
        identifier: Identifier,
        globals: &[Arc<dyn Subscriber>],
    ) -> Result<DeviceStream> {
        let transport = self
            .factory
            .create(descriptor, self.config.serial_settings())?;
        let stream = DeviceStream::new(identifier, transport, &self.config);
        for subscriber in globals {
            stream.attach(Route::Global, Arc::clone(subscriber))?;
        }
        stream.start()?;
        Ok(stream)
    }
}

fn poll_loop(inner: &Inner, stopped: &mpsc::Receiver<()>, interval: Duration) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if let Ok(changes) = inner.refresh() {
                    if !changes.is_empty() {
                        debug!(
                            plugged = changes.plugged.len(),
                            unplugged = changes.unplugged.len(),
                            "hot-plug scan applied"
                        );
                    }
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// One-shot subscriber behind [`TicCore::read_next_frame`].
struct NextFrame {
    slot: Mutex<Option<SyncSender<std::result::Result<CoreFrame, CoreError>>>>,
}

impl NextFrame {
    fn fulfil(&self, outcome: std::result::Result<CoreFrame, CoreError>) {
        if let Some(sender) = lock(&self.slot).take() {
            let _ = sender.try_send(outcome);
        }
    }
}

impl Subscriber for NextFrame {
    fn on_data(&self, frame: CoreFrame) {
        self.fulfil(Ok(frame));
    }

    fn on_error(&self, error: CoreError) {
        self.fulfil(Err(error));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
