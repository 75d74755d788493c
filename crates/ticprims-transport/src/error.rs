/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified port.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// An operation required an open port.
    #[error("serial port {0} is not open")]
    NotOpen(String),

    /// The serial driver reported an error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// An I/O error occurred on the port.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port enumeration failed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
