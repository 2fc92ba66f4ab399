use countwire_protocol::{DispatchError, Record};
use countwire_transport::{ConnectionErrorKind, LinkConfig};

/// How received bytes are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Reassemble frames and decode records.
    #[default]
    Binary,
    /// Split on `\n` and report text lines.
    Lines,
}

/// Everything a session reports, in order of occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened { port: String, config: LinkConfig },
    Record(Record),
    /// A complete frame that produced no record.
    Dropped { reason: DispatchError, raw_hex: String },
    Line(String),
    Diagnostic(Diagnostic),
    Error {
        kind: ConnectionErrorKind,
        message: String,
    },
    Closed { port: String },
}

/// Non-fatal conditions worth surfacing to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// A partial frame sat idle past the staleness window.
    StaleBufferPurged { discarded: usize },
    /// A text line grew past the buffer limit without a newline.
    LineOverflow { discarded: usize },
}
