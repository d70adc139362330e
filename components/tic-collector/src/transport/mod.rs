/// Reader adaptor that ends on shutdown.
pub mod async_read;
/// Timeout and length bounded line reads.
pub mod line_reader;
/// Serial port setup.
pub mod serial;

/// Errors surfaced by the byte transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("unsupported serial setting: {0}")]
    InvalidSettings(String),
    #[error("line longer than {0} bytes dropped")]
    LineTooLong(usize),
    #[error("no line received within {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport read failed: {0}")]
    Io(#[from] std::io::Error),
}
