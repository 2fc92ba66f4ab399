use std::fmt;
use std::io;

use countwire_frame::FrameError;
use countwire_session::SessionError;
use countwire_transport::{classify, ConnectionErrorKind, TransportError};

// Exit codes follow the sysexits-style layout used across the CLI.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

/// Exit code for a classified connection failure.
pub fn connection_code(kind: &ConnectionErrorKind) -> i32 {
    match kind {
        ConnectionErrorKind::AccessDenied => PERMISSION_DENIED,
        ConnectionErrorKind::PortBusy
        | ConnectionErrorKind::PortNotFound
        | ConnectionErrorKind::DeviceNotReady
        | ConnectionErrorKind::Unknown(_) => TRANSPORT_ERROR,
    }
}

fn with_guidance(context: &str, err: impl fmt::Display, kind: &ConnectionErrorKind) -> String {
    format!("{context}: {err} ({})", kind.guidance())
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::UnsupportedConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => {
            let kind = classify(&other);
            CliError::new(connection_code(&kind), with_guidance(context, other, &kind))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::InvalidPayloadLength { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match &err {
        SessionError::Connection { kind, .. } | SessionError::Write { kind, .. } => {
            CliError::new(connection_code(kind), with_guidance(context, &err, kind))
        }
        SessionError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SessionError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        SessionError::NotConnected => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_failures_map_to_stable_codes() {
        let denied = SessionError::Connection {
            kind: ConnectionErrorKind::AccessDenied,
            message: "denied".to_string(),
        };
        assert_eq!(session_error("connect", denied).code, PERMISSION_DENIED);

        let missing = SessionError::Connection {
            kind: ConnectionErrorKind::PortNotFound,
            message: "gone".to_string(),
        };
        let err = session_error("connect", missing);
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("check the cable"));

        let timeout = SessionError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(session_error("connect", timeout).code, TIMEOUT);
    }

    #[test]
    fn unsupported_line_settings_are_usage_errors() {
        let err = transport_error(
            "open",
            TransportError::UnsupportedConfig("1.5 stop bits".to_string()),
        );
        assert_eq!(err.code, USAGE);
    }
}
