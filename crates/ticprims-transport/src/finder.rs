use std::fmt;

use serialport::SerialPortType;
use tracing::trace;

use crate::error::{Result, TransportError};

/// A serial port reported by a [`PortFinder`].
///
/// `port_name` is the OS path used to open the port (`/dev/ttyUSB0`, `COM3`),
/// `port_id` its short system name (`ttyUSB0`). USB details are filled in
/// when the driver reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    pub port_id: Option<String>,
    pub port_name: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl PortDescriptor {
    /// Descriptor for a port known only by its OS path.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            port_id: Some(system_name(&path).to_string()),
            port_name: Some(path),
            ..Self::default()
        }
    }

    /// Path to hand to the serial driver.
    pub fn device_path(&self) -> Option<&str> {
        self.port_name.as_deref().or(self.port_id.as_deref())
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.device_path(), &self.serial_number) {
            (Some(path), Some(serial)) => write!(f, "{path} (serial {serial})"),
            (Some(path), None) => f.write_str(path),
            (None, Some(serial)) => write!(f, "serial {serial}"),
            (None, None) => f.write_str("<unnamed port>"),
        }
    }
}

/// Enumerates the modems currently plugged in.
pub trait PortFinder: Send + Sync {
    /// Snapshot of every matching port.
    fn find_all(&self) -> Result<Vec<PortDescriptor>>;
}

/// [`PortFinder`] backed by `serialport::available_ports`.
///
/// By default only USB ports are reported, since TIC modems are USB
/// serial adapters. An optional vid/pid allow-list narrows it further.
#[derive(Debug, Clone)]
pub struct SerialPortFinder {
    usb_only: bool,
    allowed: Vec<(u16, u16)>,
}

impl SerialPortFinder {
    /// Finder reporting every USB serial port.
    pub fn new() -> Self {
        Self {
            usb_only: true,
            allowed: Vec::new(),
        }
    }

    /// Also report non-USB ports (PCI, Bluetooth, unknown).
    pub fn include_non_usb(mut self) -> Self {
        self.usb_only = false;
        self
    }

    /// Only report USB ports with the given vendor/product id.
    ///
    /// May be called repeatedly to allow several modem models.
    pub fn with_usb_id(mut self, vid: u16, pid: u16) -> Self {
        self.allowed.push((vid, pid));
        self
    }

    fn accepts(&self, descriptor: &PortDescriptor, is_usb: bool) -> bool {
        if self.usb_only && !is_usb {
            return false;
        }
        if self.allowed.is_empty() {
            return true;
        }
        match (descriptor.vid, descriptor.pid) {
            (Some(vid), Some(pid)) => self.allowed.contains(&(vid, pid)),
            _ => false,
        }
    }
}

impl Default for SerialPortFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl PortFinder for SerialPortFinder {
    fn find_all(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()
            .map_err(|err| TransportError::Enumerate(err.to_string()))?;

        let found = ports
            .into_iter()
            // On macOS only the /dev/cu.* (calling unit) devices are usable without carrier detect.
            .filter(|_p| {
                #[cfg(target_os = "macos")]
                {
                    !_p.port_name.starts_with("/dev/tty.")
                }
                #[cfg(not(target_os = "macos"))]
                {
                    true
                }
            })
            .filter_map(|p| {
                let mut descriptor = PortDescriptor::from_path(p.port_name);
                let is_usb = match p.port_type {
                    SerialPortType::UsbPort(info) => {
                        descriptor.vid = Some(info.vid);
                        descriptor.pid = Some(info.pid);
                        descriptor.serial_number = info.serial_number;
                        descriptor.manufacturer = info.manufacturer;
                        descriptor.product = info.product;
                        true
                    }
                    SerialPortType::BluetoothPort
                    | SerialPortType::PciPort
                    | SerialPortType::Unknown => false,
                };
                self.accepts(&descriptor, is_usb).then_some(descriptor)
            })
            .collect::<Vec<_>>();

        trace!(count = found.len(), "enumerated serial ports");
        Ok(found)
    }
}

fn system_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
