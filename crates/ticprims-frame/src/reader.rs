//! Frame extraction from a polled serial transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use ticprims_transport::SerialTransport;
use tracing::{debug, trace, warn};

use crate::delimiters::{ETX, STX};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 2 * 1024;
const READ_CHUNK_SIZE: usize = 512;

/// Default cap on a partial frame: well above the largest standard frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Default sleep between polls when no input is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for the stream reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Give up on a frame after this long. `None` or zero waits forever.
    pub read_timeout: Option<Duration>,
    /// Sleep between polls when the port has nothing to read.
    pub poll_interval: Duration,
    /// Maximum size of a frame, delimiters included.
    pub max_frame_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_secs(10)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

struct ReaderState<T> {
    transport: T,
    // Either empty or starting with STX.
    pending: BytesMut,
}

impl<T> ReaderState<T> {
    fn accept(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        self.resync();
    }

    /// Drop everything before the next STX.
    fn resync(&mut self) {
        match self.pending.iter().position(|b| *b == STX) {
            Some(0) => {}
            Some(pos) => {
                trace!(discarded = pos, "discarding bytes before STX");
                let _ = self.pending.split_to(pos);
            }
            None => self.pending.clear(),
        }
    }

    fn take_frame(&mut self, max_frame_size: usize) -> Result<Option<Bytes>> {
        if let Some(end) = self.pending.iter().position(|b| *b == ETX) {
            let frame = self.pending.split_to(end + 1).freeze();
            self.resync();
            return Ok(Some(frame));
        }
        if self.pending.len() > max_frame_size {
            let size = self.pending.len();
            self.pending.clear();
            return Err(FrameError::FrameTooLarge {
                size,
                max: max_frame_size,
            });
        }
        Ok(None)
    }
}

/// Extracts `STX ... ETX` frames from a serial transport.
///
/// The transport is opened on first read. Reads poll the port, sleeping
/// briefly whenever nothing is available, until a complete frame arrives or
/// the configured timeout elapses. Access to the transport is serialized, so
/// [`StreamReader::reset`] and [`StreamReader::close`] may be called from
/// other threads while a read is in progress.
pub struct StreamReader<T> {
    state: Mutex<ReaderState<T>>,
    config: ReaderConfig,
    interrupted: AtomicBool,
}

impl<T: SerialTransport> StreamReader<T> {
    /// Create a new stream reader with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ReaderConfig::default())
    }

    /// Create a new stream reader with explicit configuration.
    pub fn with_config(transport: T, config: ReaderConfig) -> Self {
        Self {
            state: Mutex::new(ReaderState {
                transport,
                pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            }),
            config,
            interrupted: AtomicBool::new(false),
        }
    }

    /// Read the next complete frame, delimiters included.
    ///
    /// Returns `Ok(None)` if no complete frame arrived within the read timeout.
    /// Bytes received after the frame's ETX are kept for the next call.
    pub fn read(&self) -> Result<Option<Bytes>> {
        let deadline = self
            .config
            .read_timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(FrameError::Interrupted);
            }

            {
                let mut state = self.lock();
                if let Some(frame) = state.take_frame(self.config.max_frame_size)? {
                    trace!(len = frame.len(), "read frame");
                    return Ok(Some(frame));
                }

                state.transport.open()?;
                let available = state.transport.bytes_available()?;
                if available > 0 {
                    let want = available.min(READ_CHUNK_SIZE);
                    let read = state.transport.read_bytes(&mut chunk[..want])?;
                    if read > 0 {
                        state.accept(&chunk[..read]);
                        continue;
                    }
                }
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(None);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Close and reopen the connection, discarding buffered input and output.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock();
        state.pending.clear();
        state.transport.close()?;
        state.transport.open()?;
        state.transport.purge()?;
        debug!(port = %state.transport.port_name(), "reset serial connection");
        Ok(())
    }

    /// Close the connection. The next read reopens it.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        state.pending.clear();
        state.transport.close()?;
        Ok(())
    }

    /// Make the current and all future reads fail with
    /// [`FrameError::Interrupted`].
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Whether [`StreamReader::interrupt`] has been called.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Change the line speed of the underlying transport.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        let mut state = self.lock();
        if state.transport.baud_rate() != baud_rate {
            state.pending.clear();
            state.transport.set_baud_rate(baud_rate)?;
        }
        Ok(())
    }

    pub fn baud_rate(&self) -> u32 {
        self.lock().transport.baud_rate()
    }

    pub fn port_name(&self) -> String {
        self.lock().transport.port_name().to_string()
    }

    /// Current reader configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("stream reader lock poisoned; continuing");
            poisoned.into_inner()
        })
    }
}
