/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// Port enumeration failed.
    #[error("failed to enumerate ports: {0}")]
    Enumerate(String),

    /// The requested line settings cannot be applied by this transport.
    #[error("unsupported link configuration: {0}")]
    UnsupportedConfig(String),

    /// An I/O error occurred on an open link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link has been closed.
    #[error("link closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
