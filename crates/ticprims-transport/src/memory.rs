//! In-memory transport and port finder.
//!
//! A [`MemoryLine`] plays the modem side of a serial line: test code feeds
//! bytes into it and inspects what the transport did (opens, purges, baud
//! changes). [`StaticPortFinder`] reports a descriptor list the test can
//! mutate to simulate plug and unplug events.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, TransportError};
use crate::finder::{PortDescriptor, PortFinder};
use crate::settings::SerialSettings;
use crate::traits::{SerialTransport, TransportFactory};

#[derive(Debug, Default)]
struct LineState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    open: bool,
    opens: usize,
    purges: usize,
    fail_open: bool,
    baud_rate: u32,
}

/// Modem side of an in-memory serial line.
#[derive(Debug, Clone, Default)]
pub struct MemoryLine {
    state: Arc<Mutex<LineState>>,
}

impl MemoryLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport talking to this line.
    pub fn transport(&self, port_name: impl Into<String>, settings: SerialSettings) -> MemoryTransport {
        self.lock().baud_rate = settings.baud_rate;
        MemoryTransport {
            port_name: port_name.into(),
            baud_rate: settings.baud_rate,
            open: false,
            line: self.clone(),
        }
    }

    /// Queue bytes for the transport to read.
    pub fn feed(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Bytes queued but not yet read.
    pub fn pending(&self) -> usize {
        self.lock().rx.len()
    }

    /// Everything the transport has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// Number of purges.
    pub fn purge_count(&self) -> usize {
        self.lock().purges
    }

    /// Whether a transport currently holds the line open.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Baud rate most recently applied by the transport.
    pub fn baud_rate(&self) -> u32 {
        self.lock().baud_rate
    }

    /// Make subsequent opens fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    fn lock(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Transport end of a [`MemoryLine`].
#[derive(Debug)]
pub struct MemoryTransport {
    port_name: String,
    baud_rate: u32,
    open: bool,
    line: MemoryLine,
}

impl MemoryTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen(self.port_name.clone()))
        }
    }
}

impl SerialTransport for MemoryTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        let mut state = self.line.lock();
        if state.fail_open {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} unavailable", self.port_name),
            )));
        }
        state.open = true;
        state.opens += 1;
        state.baud_rate = self.baud_rate;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn bytes_available(&mut self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.line.lock().rx.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let mut state = self.line.lock();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.line.lock().tx.extend_from_slice(buf);
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.line.lock();
        state.rx.clear();
        state.purges += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.line.lock().open = false;
        }
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = baud_rate;
        if self.open {
            self.line.lock().baud_rate = baud_rate;
        }
        Ok(())
    }
}

/// [`TransportFactory`] handing out [`MemoryTransport`]s, one line per port path.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransportFactory {
    lines: Arc<Mutex<HashMap<String, MemoryLine>>>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The line behind `port`, created on first use.
    pub fn line(&self, port: &str) -> MemoryLine {
        let mut lines = self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.entry(port.to_string()).or_default().clone()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create(
        &self,
        descriptor: &PortDescriptor,
        settings: SerialSettings,
    ) -> Result<Box<dyn SerialTransport>> {
        let path = descriptor
            .device_path()
            .ok_or_else(|| TransportError::NotOpen(descriptor.to_string()))?;
        Ok(Box::new(self.line(path).transport(path, settings)))
    }
}

/// [`PortFinder`] returning a mutable, shared descriptor list.
#[derive(Debug, Clone, Default)]
pub struct StaticPortFinder {
    state: Arc<Mutex<FinderState>>,
}

#[derive(Debug, Default)]
struct FinderState {
    ports: Vec<PortDescriptor>,
    fail: bool,
}

impl StaticPortFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `descriptor` from now on.
    pub fn plug(&self, descriptor: PortDescriptor) {
        let mut state = self.lock();
        if !state.ports.contains(&descriptor) {
            state.ports.push(descriptor);
        }
    }

    /// Stop reporting any descriptor with the given device path.
    pub fn unplug(&self, path: &str) {
        self.lock()
            .ports
            .retain(|descriptor| descriptor.device_path() != Some(path));
    }

    /// Make `find_all` fail until reset.
    pub fn set_failing(&self, fail: bool) {
        self.lock().fail = fail;
    }

    fn lock(&self) -> MutexGuard<'_, FinderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PortFinder for StaticPortFinder {
    fn find_all(&self) -> Result<Vec<PortDescriptor>> {
        let state = self.lock();
        if state.fail {
            return Err(TransportError::Enumerate("enumeration disabled".to_string()));
        }
        Ok(state.ports.clone())
    }
}
