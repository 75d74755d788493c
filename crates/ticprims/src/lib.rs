//! Read French electricity meters through their TIC (télé-information
//! client) output.
//!
//! # Crate Structure
//!
//! - [`transport`] - Serial port access and modem enumeration
//! - [`frame`] - Checksums, mode detection, frame codec and stream reading
//! - [`core`] - Hot-plug tracking and frame subscriptions (behind `core` feature)

/// Re-export transport types.
pub mod transport {
    pub use ticprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ticprims_frame::*;
}

/// Re-export core types (requires `core` feature).
#[cfg(feature = "core")]
pub mod core {
    pub use ticprims_core::*;
}
