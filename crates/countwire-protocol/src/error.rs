use countwire_frame::{FrameError, FrameFormat};

/// Why a frame could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The carried checksum does not match the recomputed one.
    #[error("{protocol} checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch {
        protocol: FrameFormat,
        expected: u8,
        actual: u8,
    },

    /// The command-group or mode byte is not one this decoder knows.
    #[error("{protocol} command {command:#04x} not supported")]
    UnsupportedCommand { protocol: FrameFormat, command: u8 },

    /// Fewer data bytes than the command's layout requires.
    #[error("{protocol} command {command:#04x} truncated ({actual} of {expected} data bytes)")]
    Truncated {
        protocol: FrameFormat,
        command: u8,
        expected: usize,
        actual: usize,
    },

    /// A field holds a value outside its defined range.
    #[error("invalid {field} value {value:#04x}")]
    InvalidField { field: &'static str, value: u8 },

    /// The decoder was handed a frame of another format.
    #[error("{decoder} decoder cannot handle {format} frames")]
    WrongFormat {
        decoder: &'static str,
        format: FrameFormat,
    },
}

/// Outcome of dispatching a frame through the registry without a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No registered decoder accepts this header/command combination.
    #[error("no decoder for header {header:02X?} command {command:#04x}")]
    Unmatched { header: [u8; 2], command: u8 },

    /// A decoder accepted the frame but failed to decode it.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors building a wire frame from a record.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A fixed-width field value does not fit.
    #[error("{field} too long ({actual} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// The format has no encoding for this record kind.
    #[error("{protocol} cannot carry a {kind} record")]
    Unsupported {
        protocol: FrameFormat,
        kind: &'static str,
    },

    /// Framing failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
