//! Hot-plug aware access to TIC electricity meters.
//!
//! [`TicCore`] watches for USB modems, runs a [`DeviceStream`] per modem that
//! detects the protocol mode and decodes frames, and fans the resulting
//! [`CoreFrame`]s and [`CoreError`]s out to [`Subscriber`]s.

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod identifier;
pub mod orchestrator;
pub mod subscriber;

pub use config::{
    CoreConfig, DEFAULT_POLL_INTERVAL, DEFAULT_READ_NEXT_TIMEOUT, DEFAULT_READ_TIMEOUT,
    DEFAULT_RETRY_INTERVAL,
};
pub use device::DeviceStream;
pub use error::{ErrorCode, Result, TicError};
pub use event::{CoreError, CoreFrame};
pub use identifier::Identifier;
pub use orchestrator::{PlugChanges, TicCore};
pub use subscriber::Subscriber;
