use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::finder::PortDescriptor;
use crate::settings::SerialSettings;
use crate::traits::{SerialTransport, TransportFactory};

/// Per-read driver timeout. Reads are only issued once bytes are available,
/// so this only bounds a read racing with an unplug.
const DRIVER_TIMEOUT: Duration = Duration::from_millis(50);

/// Serial transport backed by the `serialport` crate.
pub struct SerialPortTransport {
    port_name: String,
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortTransport {
    /// Create a closed transport for the OS port `port_name`
    /// (e.g. `/dev/ttyUSB0`, `COM3`).
    pub fn new(port_name: impl Into<String>, settings: SerialSettings) -> Self {
        Self {
            port_name: port_name.into(),
            settings,
            port: None,
        }
    }

    /// Line settings used on open.
    pub fn settings(&self) -> SerialSettings {
        self.settings
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(TransportError::NotOpen(self.port_name.clone())),
        }
    }
}

impl SerialTransport for SerialPortTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits())
            .parity(self.settings.parity())
            .stop_bits(self.settings.stop_bits())
            .timeout(DRIVER_TIMEOUT)
            .open()
            .map_err(|source| TransportError::Open {
                port: self.port_name.clone(),
                source,
            })?;

        info!(port = %self.port_name, settings = %self.settings, "opened serial port");
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let available = self.port_mut()?.bytes_to_read()?;
        Ok(available as usize)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port_mut()?.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::TimedOut => Ok(0),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "closed serial port");
        }
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.settings.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.settings.baud_rate = baud_rate;
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(baud_rate)?;
            debug!(port = %self.port_name, baud_rate, "changed baud rate");
        }
        Ok(())
    }
}

impl Drop for SerialPortTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("port_name", &self.port_name)
            .field("settings", &self.settings)
            .field("open", &self.port.is_some())
            .finish()
    }
}

/// Factory producing [`SerialPortTransport`]s for discovered ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortFactory;

impl TransportFactory for SerialPortFactory {
    fn create(
        &self,
        descriptor: &PortDescriptor,
        settings: SerialSettings,
    ) -> Result<Box<dyn SerialTransport>> {
        let path = descriptor
            .device_path()
            .ok_or_else(|| TransportError::NotOpen(descriptor.to_string()))?;
        Ok(Box::new(SerialPortTransport::new(path, settings)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transport_is_closed() {
        let transport = SerialPortTransport::new("/dev/ttyTIC-none", SerialSettings::historic());
        assert!(!transport.is_open());
        assert_eq!(transport.port_name(), "/dev/ttyTIC-none");
        assert_eq!(transport.baud_rate(), 1200);
    }

    #[test]
    fn io_on_closed_transport_fails() {
        let mut transport =
            SerialPortTransport::new("/dev/ttyTIC-none", SerialSettings::historic());
        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.read_bytes(&mut buf),
            Err(TransportError::NotOpen(_))
        ));
        assert!(matches!(
            transport.bytes_available(),
            Err(TransportError::NotOpen(_))
        ));
        assert!(matches!(transport.purge(), Err(TransportError::NotOpen(_))));
    }

    #[test]
    fn open_missing_port_reports_port_name() {
        let mut transport =
            SerialPortTransport::new("/dev/ttyTIC-does-not-exist", SerialSettings::standard());
        let err = transport.open().unwrap_err();
        match err {
            TransportError::Open { port, .. } => assert_eq!(port, "/dev/ttyTIC-does-not-exist"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!transport.is_open());
    }

    #[test]
    fn set_baud_rate_while_closed_is_remembered() {
        let mut transport =
            SerialPortTransport::new("/dev/ttyTIC-none", SerialSettings::historic());
        transport.set_baud_rate(9600).unwrap();
        assert_eq!(transport.baud_rate(), 9600);
        assert_eq!(transport.settings().baud_rate, 9600);
    }

    #[test]
    fn close_is_idempotent() {
        let mut transport =
            SerialPortTransport::new("/dev/ttyTIC-none", SerialSettings::historic());
        transport.close().unwrap();
        transport.close().unwrap();
    }

    #[test]
    fn factory_requires_device_path() {
        let descriptor = PortDescriptor {
            serial_number: Some("021861348497".to_string()),
            ..PortDescriptor::default()
        };
        assert!(SerialPortFactory
            .create(&descriptor, SerialSettings::historic())
            .is_err());

        let descriptor = PortDescriptor {
            port_name: Some("/dev/ttyUSB0".to_string()),
            ..PortDescriptor::default()
        };
        let transport = SerialPortFactory
            .create(&descriptor, SerialSettings::standard())
            .unwrap();
        assert_eq!(transport.port_name(), "/dev/ttyUSB0");
        assert_eq!(transport.baud_rate(), 9600);
    }
}
