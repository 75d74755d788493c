//! Line settings mandated by the TIC protocol.
//!
//! Only the baud rate varies between meters: the historic variant talks at
//! 1200 baud, the standard variant at 9600. Character framing is always
//! 7 data bits, even parity, 1 stop bit.

use serialport::{DataBits, Parity, StopBits};

/// Data bits per character.
pub const DATA_BITS: u8 = 7;

/// Stop bits per character.
pub const STOP_BITS: u8 = 1;

/// Baud rate of historic-mode meters.
pub const HISTORIC_BAUD_RATE: u32 = 1200;

/// Baud rate of standard-mode meters.
pub const STANDARD_BAUD_RATE: u32 = 9600;

/// Serial line configuration for one modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Line speed in baud.
    pub baud_rate: u32,
}

impl SerialSettings {
    /// Settings for the given baud rate.
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    /// Historic-mode settings (1200 baud).
    pub fn historic() -> Self {
        Self::new(HISTORIC_BAUD_RATE)
    }

    /// Standard-mode settings (9600 baud).
    pub fn standard() -> Self {
        Self::new(STANDARD_BAUD_RATE)
    }

    pub(crate) fn data_bits(&self) -> DataBits {
        DataBits::Seven
    }

    pub(crate) fn parity(&self) -> Parity {
        Parity::Even
    }

    pub(crate) fn stop_bits(&self) -> StopBits {
        StopBits::One
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::historic()
    }
}

impl std::fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} baud {}E{}", self.baud_rate, DATA_BITS, STOP_BITS)
    }
}
