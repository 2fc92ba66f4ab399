use crate::format::FrameFormat;

/// Errors that can occur during frame encoding or stream reading.
///
/// Malformed or incomplete input is not an error: the reassembler drops or
/// retains it and simply yields fewer frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the format's length field.
    #[error("{format} payload too large ({size} bytes, max {max})")]
    PayloadTooLarge {
        format: FrameFormat,
        size: usize,
        max: usize,
    },

    /// The payload does not have the length the format requires.
    #[error("{format} payload must be {expected} bytes, got {actual}")]
    InvalidPayloadLength {
        format: FrameFormat,
        expected: usize,
        actual: usize,
    },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
