use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::{crc8, sum8};
use crate::error::{FrameError, Result};
use crate::format::{FrameFormat, Probe, COUNTING_MACHINE_LEN, ZM_TRAILER};

/// Payload size of a counting-machine frame (group byte through error code).
const COUNTING_MACHINE_PAYLOAD: usize = COUNTING_MACHINE_LEN - 4;
/// Largest CDM payload: the length byte must stay within `u8`.
const CDM_MAX_PAYLOAD: usize = u8::MAX as usize - 2;

/// A structurally delimited span of the byte stream, prior to decoding.
///
/// Only built once the whole declared length is buffered; immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    format: FrameFormat,
    declared_length: usize,
    raw: Bytes,
}

impl Frame {
    /// Wrap exactly one complete frame. `raw` must have been sized by
    /// [`FrameFormat::probe`].
    pub(crate) fn from_raw(format: FrameFormat, raw: Bytes) -> Self {
        let declared_length = match format {
            FrameFormat::CountingMachine | FrameFormat::Cdm => raw[2] as usize,
            FrameFormat::Zm => u16::from_le_bytes([raw[2], raw[3]]) as usize,
        };
        Self {
            format,
            declared_length,
            raw,
        }
    }

    /// Parse a byte slice holding exactly one complete frame.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match FrameFormat::probe(bytes, bytes.len()) {
            Probe::Complete(format, total) if total == bytes.len() => {
                Some(Self::from_raw(format, Bytes::copy_from_slice(bytes)))
            }
            _ => None,
        }
    }

    /// Which wire format delimited this frame.
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// The 2-byte header.
    pub fn header(&self) -> [u8; 2] {
        [self.raw[0], self.raw[1]]
    }

    /// Raw value of the length field; its meaning depends on the format.
    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    /// Bytes between the header/length fields and the checksum. The first
    /// byte is the command group (FD DF formats) or mode (ZM).
    pub fn payload(&self) -> &[u8] {
        let start = self.format.payload_offset();
        let end = self.raw.len() - self.format.suffix_len();
        &self.raw[start..end]
    }

    /// Command-group or mode byte.
    pub fn command(&self) -> u8 {
        self.payload()[0]
    }

    /// Payload after the command byte.
    pub fn data(&self) -> &[u8] {
        &self.payload()[1..]
    }

    /// The checksum byte carried on the wire.
    pub fn checksum(&self) -> u8 {
        self.raw[self.raw.len() - self.format.suffix_len()]
    }

    /// Checksum recomputed over the bytes this format protects.
    pub fn expected_checksum(&self) -> u8 {
        match self.format {
            FrameFormat::CountingMachine | FrameFormat::Cdm => {
                crc8(&self.raw[..self.raw.len() - 1])
            }
            FrameFormat::Zm => sum8(self.payload()),
        }
    }

    /// True if the carried checksum matches the recomputed one.
    pub fn checksum_ok(&self) -> bool {
        self.checksum() == self.expected_checksum()
    }

    /// The exact bytes consumed from the stream.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Uppercase hex of the raw bytes, for diagnostics.
    pub fn raw_hex(&self) -> String {
        hex::encode_upper(&self.raw)
    }

    /// Total wire size.
    pub fn wire_size(&self) -> usize {
        self.raw.len()
    }
}

/// Encode a frame into its wire format.
///
/// `payload` starts with the command-group or mode byte. Checksums, length
/// fields and trailers are filled in here.
pub fn encode_frame(format: FrameFormat, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    match format {
        FrameFormat::CountingMachine => {
            if payload.len() != COUNTING_MACHINE_PAYLOAD {
                return Err(FrameError::InvalidPayloadLength {
                    format,
                    expected: COUNTING_MACHINE_PAYLOAD,
                    actual: payload.len(),
                });
            }
            let start = dst.len();
            dst.reserve(COUNTING_MACHINE_LEN);
            dst.put_slice(&format.header());
            dst.put_u8(COUNTING_MACHINE_LEN as u8);
            dst.put_slice(payload);
            let crc = crc8(&dst[start..]);
            dst.put_u8(crc);
        }
        FrameFormat::Cdm => {
            if payload.is_empty() || payload.len() > CDM_MAX_PAYLOAD {
                return Err(FrameError::PayloadTooLarge {
                    format,
                    size: payload.len(),
                    max: CDM_MAX_PAYLOAD,
                });
            }
            let start = dst.len();
            dst.reserve(payload.len() + 4);
            dst.put_slice(&format.header());
            dst.put_u8((payload.len() + 2) as u8);
            dst.put_slice(payload);
            let crc = crc8(&dst[start..]);
            dst.put_u8(crc);
        }
        FrameFormat::Zm => {
            if payload.is_empty() || payload.len() > u16::MAX as usize {
                return Err(FrameError::PayloadTooLarge {
                    format,
                    size: payload.len(),
                    max: u16::MAX as usize,
                });
            }
            dst.reserve(payload.len() + 7);
            dst.put_slice(&format.header());
            dst.put_u16_le(payload.len() as u16);
            dst.put_slice(payload);
            dst.put_u8(sum8(payload));
            dst.put_slice(&ZM_TRAILER);
        }
    }
    Ok(())
}
