//! Fixed 44-byte counting-machine result frames.
//!
//! ```text
//! 0-1   FD DF header
//! 2     0x2C total length
//! 3     0x0E command group
//! 4     status
//! 5-8   total count      (u32 LE)
//! 9-12  denomination     (u32 LE)
//! 13-20 total amount     (u64 LE)
//! 21-24 currency code    (ASCII, zero padded)
//! 25-35 serial number    (ASCII, zero padded)
//! 36-41 reserved
//! 42    error code
//! 43    CRC-8 over bytes 0-42
//! ```

use bytes::Buf;
use countwire_frame::{Frame, FrameFormat, CDM_HEADER, COUNTING_MACHINE_LEN};
use tracing::trace;

use crate::body::{ascii_field, CURRENCY_LEN, SERIAL_LEN};
use crate::config::{ChecksumPolicy, DecoderConfig};
use crate::decoder::{record, verify_checksum, Decoder, ProtocolType};
use crate::error::{DecodeError, Result};
use crate::record::{CountResult, CountStatus, Record, RecordKind};

/// Command group carried by every counting-machine frame.
pub const GROUP: u8 = 0x0E;
pub(crate) const RESERVED_LEN: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct CountingMachineDecoder {
    checksum_policy: ChecksumPolicy,
}

impl CountingMachineDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            checksum_policy: config.checksum_policy,
        }
    }
}

impl Decoder for CountingMachineDecoder {
    fn protocol(&self) -> ProtocolType {
        FrameFormat::CountingMachine
    }

    fn can_handle(&self, frame: &Frame) -> bool {
        frame.header() == CDM_HEADER
            && frame.command() == GROUP
            && frame.wire_size() == COUNTING_MACHINE_LEN
    }

    fn decode(&self, frame: &Frame) -> Result<Record> {
        if !self.can_handle(frame) {
            return Err(DecodeError::WrongFormat {
                decoder: self.name(),
                format: frame.format(),
            });
        }
        let checksum_valid = verify_checksum(frame, self.checksum_policy)?;

        let mut buf = frame.data();
        let status = CountStatus::try_from(buf.get_u8())?;
        let total_count = buf.get_u32_le();
        let denomination = buf.get_u32_le();
        let total_amount = buf.get_u64_le();
        let currency_code = ascii_field(&mut buf, CURRENCY_LEN);
        let serial_number = ascii_field(&mut buf, SERIAL_LEN);
        let reserved = buf[..RESERVED_LEN].to_vec();
        buf.advance(RESERVED_LEN);
        let error_code = buf.get_u8();

        trace!(?status, total_count, total_amount, "counting-machine result");
        Ok(record(
            frame,
            checksum_valid,
            RecordKind::CountResult(CountResult {
                total_count,
                denomination,
                total_amount,
                currency_code,
                serial_number,
                reserved,
                error_code,
                status,
            }),
        ))
    }
}
