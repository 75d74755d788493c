use crate::error::Result;
use crate::finder::PortDescriptor;
use crate::settings::SerialSettings;

/// A byte-level connection to one serial modem.
///
/// Implementations open lazily: nothing touches the device until
/// [`SerialTransport::open`] is called. All methods other than `open`,
/// `is_open`, `close` and the accessors fail with
/// [`TransportError::NotOpen`](crate::TransportError::NotOpen) on a closed
/// transport.
pub trait SerialTransport: Send {
    /// Name of the port this transport talks to.
    fn port_name(&self) -> &str;

    /// Open the port. Opening an already open port is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes. Returns the number of bytes read.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `buf` and flush.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Discard anything buffered in either direction.
    fn purge(&mut self) -> Result<()>;

    /// Close the port. Closing a closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Current line speed.
    fn baud_rate(&self) -> u32;

    /// Change the line speed, applied immediately when open.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bytes(buf)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_bytes(buf)
    }

    fn purge(&mut self) -> Result<()> {
        (**self).purge()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        (**self).set_baud_rate(baud_rate)
    }
}

/// Builds transports for ports reported by a [`PortFinder`](crate::PortFinder).
pub trait TransportFactory: Send + Sync {
    /// Create a (closed) transport for `descriptor`.
    fn create(
        &self,
        descriptor: &PortDescriptor,
        settings: SerialSettings,
    ) -> Result<Box<dyn SerialTransport>>;
}
