use chrono::Utc;
use countwire_frame::{Frame, FrameFormat};
use tracing::warn;

use crate::config::ChecksumPolicy;
use crate::error::{DecodeError, Result};
use crate::record::{Record, RecordKind};

/// Which decoder produced a record. Identical to the wire format.
pub type ProtocolType = FrameFormat;

/// Turns frames of one wire format into records.
pub trait Decoder: Send + Sync {
    /// The format this decoder understands.
    fn protocol(&self) -> ProtocolType;

    /// Short name for logs and listings.
    fn name(&self) -> &'static str {
        self.protocol().name()
    }

    /// Cheap structural test: header, command group, length.
    fn can_handle(&self, frame: &Frame) -> bool;

    /// Full decode, including checksum verification.
    fn decode(&self, frame: &Frame) -> Result<Record>;
}

/// Verify a frame's checksum under `policy`, returning the validity flag
/// to stamp on the record.
pub(crate) fn verify_checksum(frame: &Frame, policy: ChecksumPolicy) -> Result<bool> {
    if frame.checksum_ok() {
        return Ok(true);
    }
    let expected = frame.expected_checksum();
    let actual = frame.checksum();
    match policy {
        ChecksumPolicy::Reject => Err(DecodeError::ChecksumMismatch {
            protocol: frame.format(),
            expected,
            actual,
        }),
        ChecksumPolicy::Warn => {
            warn!(
                protocol = %frame.format(),
                expected,
                actual,
                raw = %frame.raw_hex(),
                "checksum mismatch, decoding anyway"
            );
            Ok(false)
        }
    }
}

pub(crate) fn record(frame: &Frame, checksum_valid: bool, kind: RecordKind) -> Record {
    Record {
        timestamp: Utc::now(),
        protocol: frame.format(),
        raw_data: frame.raw_hex(),
        checksum_valid,
        kind,
    }
}
