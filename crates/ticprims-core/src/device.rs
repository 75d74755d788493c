//! One modem's read loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use ticprims_frame::{decode_frame, FrameError, ModeDetectingStream, StreamReader};
use ticprims_transport::SerialTransport;
use tracing::{debug, info, trace, warn};

use crate::config::CoreConfig;
use crate::error::{ErrorCode, Result};
use crate::event::{CoreError, CoreFrame, Event};
use crate::identifier::Identifier;
use crate::subscriber::{Route, Subscriber, SubscriberList};

type BoxedTransport = Box<dyn SerialTransport>;

/// Outcome of one failed read cycle.
enum Failure {
    Interrupted,
    Failed(ErrorCode, String),
}

/// Reads frames from one modem on its own thread and publishes them to the
/// stream's subscribers.
///
/// The loop has two states. Without a mode it asks the detecting stream to
/// resolve one; with a mode it reads and decodes the next frame. Any timeout
/// or failure is published as a [`CoreError`], after which the reader is
/// reset, the mode forgotten, and the loop pauses for the configured retry
/// interval before the next attempt.
pub struct DeviceStream {
    identifier: Identifier,
    subscribers: Arc<SubscriberList>,
    reader: Arc<StreamReader<BoxedTransport>>,
    pending: Mutex<Option<ModeDetectingStream<BoxedTransport>>>,
    running: Arc<AtomicBool>,
    retry_interval: Duration,
    stop: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceStream {
    pub fn new(identifier: Identifier, transport: BoxedTransport, config: &CoreConfig) -> Self {
        let reader = StreamReader::with_config(transport, config.reader_config());
        let mut detecting = ModeDetectingStream::new(reader, config.mode);
        if config.baud_rate.is_some() {
            detecting = detecting.without_baud_switching();
        }
        Self {
            subscribers: Arc::new(SubscriberList::new(format!("tic-{identifier}"))),
            reader: detecting.reader(),
            identifier,
            pending: Mutex::new(Some(detecting)),
            running: Arc::new(AtomicBool::new(false)),
            retry_interval: config.retry_interval,
            stop: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Spawn the read loop. A stream runs at most once; later calls are no-ops.
    pub fn start(&self) -> Result<()> {
        let Some(detecting) = lock(&self.pending).take() else {
            debug!(identifier = %self.identifier, "device stream already started");
            return Ok(());
        };

        self.running.store(true, Ordering::SeqCst);
        let (stop, stopped) = mpsc::channel::<()>();
        let worker = ReadLoop {
            identifier: self.identifier.clone(),
            stream: detecting,
            subscribers: Arc::clone(&self.subscribers),
            running: Arc::clone(&self.running),
            retry_interval: self.retry_interval,
            stopped,
        };
        let handle = thread::Builder::new()
            .name(format!("tic-{}", self.identifier))
            .spawn(move || worker.run())
            .inspect_err(|_| self.running.store(false, Ordering::SeqCst))?;
        *lock(&self.stop) = Some(stop);
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    /// Stop the read loop, interrupting a read in progress, and wait for it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.reader.interrupt();
        lock(&self.stop).take();
        lock(&self.pending).take();
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                warn!(identifier = %self.identifier, "device stream thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn attach(&self, route: Route, subscriber: Arc<dyn Subscriber>) -> Result<bool> {
        self.subscribers.add(route, subscriber)
    }

    pub(crate) fn detach(&self, route: Route, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.subscribers.remove(route, subscriber)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn has_subscriber(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.subscribers.contains(subscriber)
    }

    /// Publish an error raised outside the read loop.
    pub(crate) fn notify(&self, code: ErrorCode, message: impl Into<String>) {
        self.subscribers.publish(Event::Error(CoreError::new(
            self.identifier.clone(),
            code,
            message,
        )));
    }

    /// Drop every registration; delivery threads drain and exit.
    pub(crate) fn detach_all(&self) {
        self.subscribers.clear();
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReadLoop {
    identifier: Identifier,
    stream: ModeDetectingStream<BoxedTransport>,
    subscribers: Arc<SubscriberList>,
    running: Arc<AtomicBool>,
    retry_interval: Duration,
    stopped: Receiver<()>,
}

impl ReadLoop {
    fn run(mut self) {
        info!(identifier = %self.identifier, "device stream started");
        let reader = self.stream.reader();

        while self.running.load(Ordering::SeqCst) {
            match self.tick() {
                Ok(frame) => self.subscribers.publish(Event::Data(frame)),
                Err(Failure::Interrupted) => break,
                Err(Failure::Failed(..)) if !self.running.load(Ordering::SeqCst) => break,
                Err(Failure::Failed(code, message)) => {
                    warn!(identifier = %self.identifier, %code, %message, "device stream failure");
                    self.subscribers.publish(Event::Error(CoreError::new(
                        self.identifier.clone(),
                        code,
                        message,
                    )));
                    self.stream.invalidate();
                    if let Err(err) = reader.reset() {
                        debug!(identifier = %self.identifier, error = %err, "reader reset failed");
                    }
                    if !self.pause() {
                        break;
                    }
                }
            }
        }

        if let Err(err) = reader.close() {
            debug!(identifier = %self.identifier, error = %err, "closing reader failed");
        }
        info!(identifier = %self.identifier, "device stream stopped");
    }

    /// Wait out the retry interval. Returns false once the stream is stopped.
    fn pause(&self) -> bool {
        match self.stopped.recv_timeout(self.retry_interval) {
            Err(RecvTimeoutError::Timeout) => self.running.load(Ordering::SeqCst),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn tick(&mut self) -> std::result::Result<CoreFrame, Failure> {
        let Some(mode) = self.stream.auto_detect_mode() else {
            return Err(match self.stream.take_detection_error() {
                Some(FrameError::Interrupted) => Failure::Interrupted,
                Some(err) => Failure::Failed(ErrorCode::OtherReason, err.to_string()),
                None => Failure::Failed(
                    ErrorCode::DataReadTimeout,
                    "unable to detect TIC mode".to_string(),
                ),
            });
        };

        let bytes = match self.stream.next_frame() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(Failure::Failed(
                    ErrorCode::DataReadTimeout,
                    "no frame received before timeout".to_string(),
                ))
            }
            Err(FrameError::Interrupted) => return Err(Failure::Interrupted),
            Err(err) => return Err(Failure::Failed(ErrorCode::OtherReason, err.to_string())),
        };

        trace!(identifier = %self.identifier, len = bytes.len(), "frame received");
        let frame = decode_frame(&bytes, mode)
            .map_err(|err| Failure::Failed(ErrorCode::OtherReason, err.to_string()))?;

        Ok(CoreFrame {
            identifier: self.identifier.clone(),
            mode,
            capture_time: SystemTime::now(),
            frame,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use ticprims_frame::{Mode, ModeSelection};
    use ticprims_transport::memory::MemoryLine;

    use super::*;
    use crate::subscriber::tests::ChannelSubscriber;

    const HISTORIC_FRAME: &[u8] = b"\x02\nADCO 031664001115 +\r\nPTEC TH.. >\r\x03";

    fn stream(line: &MemoryLine, config: &CoreConfig) -> DeviceStream {
        let identifier = Identifier::port("ttyMEM0").expect("identifier");
        let transport = line.transport("ttyMEM0", config.serial_settings());
        DeviceStream::new(identifier, Box::new(transport), config)
    }

    fn fast_config() -> CoreConfig {
        CoreConfig::default()
            .with_read_timeout(Some(Duration::from_millis(50)))
            .with_retry_interval(Duration::from_millis(10))
    }

    fn next(events: &Receiver<Event>) -> Event {
        events
            .recv_timeout(Duration::from_secs(2))
            .expect("event should arrive")
    }

    #[test]
    fn publishes_decoded_frames() {
        let line = MemoryLine::new();
        line.feed(HISTORIC_FRAME);
        line.feed(HISTORIC_FRAME);
        let stream = stream(&line, &fast_config());
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Global, subscriber).expect("attach");
        stream.start().expect("start");

        for _ in 0..2 {
            match next(&events) {
                Event::Data(frame) => {
                    assert_eq!(frame.mode, Mode::Historic);
                    assert_eq!(frame.frame.value("ADCO"), Some("031664001115"));
                    assert_eq!(frame.identifier.port_id(), Some("ttyMEM0"));
                }
                Event::Error(err) => panic!("unexpected error: {err}"),
            }
        }
        stream.stop();
        assert!(!stream.is_running());
    }

    #[test]
    fn silence_reports_timeout() {
        let line = MemoryLine::new();
        let stream = stream(&line, &fast_config());
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Direct, subscriber).expect("attach");
        stream.start().expect("start");

        match next(&events) {
            Event::Error(err) => assert_eq!(err.code, ErrorCode::DataReadTimeout),
            Event::Data(_) => panic!("no data was fed"),
        }
        stream.stop();
        assert!(line.purge_count() >= 1);
    }

    #[test]
    fn undecodable_frame_reports_other_reason_and_recovers() {
        let line = MemoryLine::new();
        let config = CoreConfig::default()
            .with_mode(ModeSelection::Historic)
            .with_read_timeout(Some(Duration::from_millis(500)))
            .with_retry_interval(Duration::from_millis(10));
        line.feed(b"\x02\nADCO 031664001115 +\r\x04\x03");
        let stream = stream(&line, &config);
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Global, subscriber).expect("attach");
        stream.start().expect("start");

        match next(&events) {
            Event::Error(err) => assert_eq!(err.code, ErrorCode::OtherReason),
            Event::Data(_) => panic!("frame with EOT must not decode"),
        }

        // Wait until the reset has purged the line before feeding again.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while line.purge_count() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        line.feed(HISTORIC_FRAME);
        let recovered = (0..3).any(|_| matches!(next(&events), Event::Data(_)));
        assert!(recovered);
        stream.stop();
    }

    #[test]
    fn stop_interrupts_blocked_read() {
        let line = MemoryLine::new();
        let config = CoreConfig::default()
            .with_mode(ModeSelection::Standard)
            .with_read_timeout(None);
        let stream = stream(&line, &config);
        stream.start().expect("start");
        thread::sleep(Duration::from_millis(30));

        let started = std::time::Instant::now();
        stream.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!line.is_open());
    }

    #[test]
    fn start_twice_is_noop() {
        let line = MemoryLine::new();
        let stream = stream(&line, &fast_config());
        stream.start().expect("start");
        stream.start().expect("second start");
        stream.stop();
        stream.start().expect("start after stop");
        assert!(!stream.is_running());
    }

    fn count_errors(events: &Receiver<Event>, window: Duration) -> (usize, usize) {
        let deadline = std::time::Instant::now() + window;
        let (mut timeouts, mut other) = (0, 0);
        while let Some(left) = deadline.checked_duration_since(std::time::Instant::now()) {
            match events.recv_timeout(left) {
                Ok(Event::Error(err)) if err.code == ErrorCode::DataReadTimeout => timeouts += 1,
                Ok(Event::Error(_)) => other += 1,
                Ok(Event::Data(_)) => panic!("no data was fed"),
                Err(_) => break,
            }
        }
        (timeouts, other)
    }

    #[test]
    fn failing_port_is_retried_at_interval() {
        let line = MemoryLine::new();
        line.set_fail_open(true);
        let config = CoreConfig::default()
            .with_read_timeout(Some(Duration::from_secs(10)))
            .with_retry_interval(Duration::from_millis(100));
        let stream = stream(&line, &config);
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Global, subscriber).expect("attach");
        stream.start().expect("start");

        let (timeouts, other) = count_errors(&events, Duration::from_millis(250));
        stream.stop();
        assert_eq!(timeouts, 0);
        assert!((1..5).contains(&other), "got {other} errors");
    }

    #[test]
    fn failing_port_under_fixed_mode_is_retried_at_interval() {
        let line = MemoryLine::new();
        line.set_fail_open(true);
        let config = CoreConfig::default()
            .with_mode(ModeSelection::Historic)
            .with_retry_interval(Duration::from_millis(100));
        let stream = stream(&line, &config);
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Direct, subscriber).expect("attach");
        stream.start().expect("start");

        let (timeouts, other) = count_errors(&events, Duration::from_millis(250));
        stream.stop();
        assert_eq!(timeouts, 0);
        assert!((1..5).contains(&other), "got {other} errors");
    }

    #[test]
    fn stop_interrupts_retry_pause() {
        let line = MemoryLine::new();
        line.set_fail_open(true);
        let config = fast_config().with_retry_interval(Duration::from_secs(30));
        let stream = stream(&line, &config);
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Global, subscriber).expect("attach");
        stream.start().expect("start");
        next(&events);

        let started = std::time::Instant::now();
        stream.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    /// Blocks in every callback until its gate closes.
    struct StuckSubscriber {
        gate: Mutex<Receiver<()>>,
    }

    impl Subscriber for StuckSubscriber {
        fn on_data(&self, _frame: CoreFrame) {
            let _ = self.gate.lock().expect("lock").recv();
        }

        fn on_error(&self, _error: CoreError) {
            let _ = self.gate.lock().expect("lock").recv();
        }
    }

    #[test]
    fn stuck_subscriber_does_not_hold_back_others() {
        let line = MemoryLine::new();
        let config = fast_config().with_mode(ModeSelection::Historic);
        let stream = stream(&line, &config);

        let (gate, gate_rx) = mpsc::channel::<()>();
        let stuck: Arc<dyn Subscriber> = Arc::new(StuckSubscriber {
            gate: Mutex::new(gate_rx),
        });
        let (fast, events) = ChannelSubscriber::new();
        stream.attach(Route::Global, stuck).expect("attach stuck");
        stream.attach(Route::Direct, fast).expect("attach fast");
        stream.start().expect("start");

        // The stuck subscriber is blocked on the first event; keep feeding
        // until the other one sees a frame.
        let received = (0..20).any(|_| {
            line.feed(HISTORIC_FRAME);
            matches!(next(&events), Event::Data(_))
        });
        assert!(received);

        stream.stop();
        drop(gate);
    }

    #[test]
    fn notify_reaches_subscribers() {
        let line = MemoryLine::new();
        let stream = stream(&line, &fast_config());
        let (subscriber, events) = ChannelSubscriber::new();
        stream.attach(Route::Direct, subscriber).expect("attach");
        stream.notify(ErrorCode::StreamUnplugged, "unplugged");
        match next(&events) {
            Event::Error(err) => assert_eq!(err.code, ErrorCode::StreamUnplugged),
            Event::Data(_) => panic!("expected error"),
        }
    }
}
