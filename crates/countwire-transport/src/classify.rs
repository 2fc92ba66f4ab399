//! Transport failure taxonomy.
//!
//! Platform error codes never leave this module: callers get one of a small
//! set of kinds, each with operator guidance.

use std::fmt;
use std::io::ErrorKind;

use serde::Serialize;

use crate::error::TransportError;

/// Classified cause of a connection failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    PortBusy,
    PortNotFound,
    AccessDenied,
    DeviceNotReady,
    Unknown(String),
}

impl ConnectionErrorKind {
    /// Operator-facing advice for this kind of failure.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::PortBusy => "close other applications using this port and try again",
            Self::PortNotFound => "check the cable and that the device is powered on",
            Self::AccessDenied => "run with permission to access the port (e.g. the dialout group)",
            Self::DeviceNotReady => "wait for the device to finish starting up, then reconnect",
            Self::Unknown(_) => "reconnect the device; if the problem persists, restart it",
        }
    }
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortBusy => f.write_str("port busy"),
            Self::PortNotFound => f.write_str("port not found"),
            Self::AccessDenied => f.write_str("access denied"),
            Self::DeviceNotReady => f.write_str("device not ready"),
            Self::Unknown(message) => write!(f, "unknown error: {message}"),
        }
    }
}

/// Map a transport error onto the taxonomy.
pub fn classify(err: &TransportError) -> ConnectionErrorKind {
    match err {
        TransportError::Open { source, .. } | TransportError::Io(source) => classify_io(source),
        TransportError::Closed => ConnectionErrorKind::DeviceNotReady,
        other => ConnectionErrorKind::Unknown(other.to_string()),
    }
}

fn classify_io(err: &std::io::Error) -> ConnectionErrorKind {
    match err.kind() {
        ErrorKind::NotFound => return ConnectionErrorKind::PortNotFound,
        ErrorKind::PermissionDenied => return ConnectionErrorKind::AccessDenied,
        ErrorKind::ResourceBusy | ErrorKind::AddrInUse => return ConnectionErrorKind::PortBusy,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            return ConnectionErrorKind::DeviceNotReady
        }
        _ => {}
    }

    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("busy") || lower.contains("in use") || lower.contains("sharing violation") {
        ConnectionErrorKind::PortBusy
    } else if lower.contains("access is denied") || lower.contains("permission denied") {
        ConnectionErrorKind::AccessDenied
    } else if lower.contains("no such file")
        || lower.contains("not found")
        || lower.contains("cannot find")
        || lower.contains("no such device")
    {
        ConnectionErrorKind::PortNotFound
    } else if lower.contains("not ready") || lower.contains("not functioning") {
        ConnectionErrorKind::DeviceNotReady
    } else {
        ConnectionErrorKind::Unknown(message)
    }
}
