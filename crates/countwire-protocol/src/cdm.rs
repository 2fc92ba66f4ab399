//! Variable-length CDM frames: `FD DF | L | group | data | crc8`.

use countwire_frame::{Frame, FrameFormat};
use tracing::trace;

use crate::body;
use crate::config::{ChecksumPolicy, DecoderConfig};
use crate::decoder::{record, verify_checksum, Decoder, ProtocolType};
use crate::error::{DecodeError, Result};
use crate::record::Record;

#[derive(Debug, Clone, Copy, Default)]
pub struct CdmDecoder {
    checksum_policy: ChecksumPolicy,
}

impl CdmDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            checksum_policy: config.checksum_policy,
        }
    }
}

impl Decoder for CdmDecoder {
    fn protocol(&self) -> ProtocolType {
        FrameFormat::Cdm
    }

    fn can_handle(&self, frame: &Frame) -> bool {
        frame.format() == FrameFormat::Cdm
    }

    fn decode(&self, frame: &Frame) -> Result<Record> {
        if !self.can_handle(frame) {
            return Err(DecodeError::WrongFormat {
                decoder: self.name(),
                format: frame.format(),
            });
        }
        let checksum_valid = verify_checksum(frame, self.checksum_policy)?;
        let kind = body::decode(FrameFormat::Cdm, frame.command(), frame.data())?;
        trace!(group = frame.command(), kind = kind.name(), "cdm record");
        Ok(record(frame, checksum_valid, kind))
    }
}
