use std::fmt;

use serde::{Deserialize, Serialize};
use ticprims_transport::PortDescriptor;

use crate::error::{Result, TicError};

/// Names one TIC modem by whatever the platform reports for it.
///
/// At least one field is always present. Two identifiers
/// [match](Identifier::matches) when the first field both carry (serial
/// number, then port id, then port name) is equal, so a caller may look a
/// modem up by serial number alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
}

impl Identifier {
    /// Build an identifier. Empty strings count as absent.
    pub fn new(
        port_id: Option<&str>,
        port_name: Option<&str>,
        serial_number: Option<&str>,
    ) -> Result<Self> {
        let keep = |field: Option<&str>| field.filter(|s| !s.is_empty()).map(str::to_string);
        let identifier = Self {
            port_id: keep(port_id),
            port_name: keep(port_name),
            serial_number: keep(serial_number),
        };
        if identifier.port_id.is_none()
            && identifier.port_name.is_none()
            && identifier.serial_number.is_none()
        {
            return Err(TicError::InvalidIdentifier);
        }
        Ok(identifier)
    }

    /// Identifier for the modem at an OS path or system name.
    pub fn port(name: &str) -> Result<Self> {
        if name.contains('/') || name.contains('\\') {
            Self::new(None, Some(name), None)
        } else {
            Self::new(Some(name), None, None)
        }
    }

    /// Identifier for the modem with a USB serial number.
    pub fn serial(serial_number: &str) -> Result<Self> {
        Self::new(None, None, Some(serial_number))
    }

    pub fn from_descriptor(descriptor: &PortDescriptor) -> Result<Self> {
        Self::new(
            descriptor.port_id.as_deref(),
            descriptor.port_name.as_deref(),
            descriptor.serial_number.as_deref(),
        )
    }

    /// Compare on the first field present on both sides.
    pub fn matches(&self, other: &Identifier) -> bool {
        let pairs = [
            (&self.serial_number, &other.serial_number),
            (&self.port_id, &other.port_id),
            (&self.port_name, &other.port_name),
        ];
        pairs
            .into_iter()
            .find_map(|pair| match pair {
                (Some(ours), Some(theirs)) => Some(ours == theirs),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn port_id(&self) -> Option<&str> {
        self.port_id.as_deref()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(name) = self.port_name.as_deref().or(self.port_id.as_deref()) {
            parts.push(name.to_string());
        }
        if let Some(serial) = &self.serial_number {
            parts.push(format!("serial {serial}"));
        }
        f.write_str(&parts.join(" "))
    }
}
