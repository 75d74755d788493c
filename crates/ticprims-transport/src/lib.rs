//! Serial transport abstraction for TIC modems.
//!
//! Provides the narrow surface the rest of ticprims depends on:
//! - [`SerialTransport`]: open / read / write / purge / close over one port
//! - [`PortFinder`]: enumeration of currently plugged modems
//! - [`TransportFactory`]: builds a transport for a discovered port
//!
//! This is the lowest layer of ticprims. The concrete implementations are
//! backed by the `serialport` crate; the `test-util` feature adds in-memory
//! doubles driven from test code.

pub mod error;
pub mod finder;
pub mod serial;
pub mod settings;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use error::{Result, TransportError};
pub use finder::{PortDescriptor, PortFinder, SerialPortFinder};
pub use serial::{SerialPortFactory, SerialPortTransport};
pub use settings::{
    SerialSettings, DATA_BITS, HISTORIC_BAUD_RATE, STANDARD_BAUD_RATE, STOP_BITS,
};
pub use traits::{SerialTransport, TransportFactory};
