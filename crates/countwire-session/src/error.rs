use std::time::Duration;

use countwire_transport::{classify, ConnectionErrorKind, TransportError};

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Opening or using the port failed.
    #[error("{kind}: {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    /// A write failed; the session has been closed.
    #[error("write failed ({kind}): {source}")]
    Write {
        kind: ConnectionErrorKind,
        #[source]
        source: TransportError,
    },

    /// The port did not open within the configured window.
    #[error("open timed out after {0:?}")]
    Timeout(Duration),

    /// The operation needs an open connection.
    #[error("not connected")]
    NotConnected,

    /// Rejected before any I/O was attempted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Classify a transport failure.
    pub fn connection(err: &TransportError) -> Self {
        Self::Connection {
            kind: classify(err),
            message: err.to_string(),
        }
    }

    /// The classified failure kind, where one applies.
    pub fn kind(&self) -> Option<&ConnectionErrorKind> {
        match self {
            Self::Connection { kind, .. } | Self::Write { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
