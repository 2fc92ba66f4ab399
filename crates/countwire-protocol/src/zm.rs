//! ZM frames: `AA 55 | N (u16 LE) | mode | data | sum8 | A5 5A`.

use countwire_frame::{Frame, FrameFormat};
use tracing::trace;

use crate::body;
use crate::config::{ChecksumPolicy, DecoderConfig};
use crate::decoder::{record, verify_checksum, Decoder, ProtocolType};
use crate::error::{DecodeError, Result};
use crate::record::Record;

#[derive(Debug, Clone, Copy, Default)]
pub struct ZmDecoder {
    checksum_policy: ChecksumPolicy,
}

impl ZmDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            checksum_policy: config.checksum_policy,
        }
    }
}

impl Decoder for ZmDecoder {
    fn protocol(&self) -> ProtocolType {
        FrameFormat::Zm
    }

    fn can_handle(&self, frame: &Frame) -> bool {
        frame.format() == FrameFormat::Zm
    }

    fn decode(&self, frame: &Frame) -> Result<Record> {
        if !self.can_handle(frame) {
            return Err(DecodeError::WrongFormat {
                decoder: self.name(),
                format: frame.format(),
            });
        }
        let checksum_valid = verify_checksum(frame, self.checksum_policy)?;
        let kind = body::decode(FrameFormat::Zm, frame.command(), frame.data())?;
        trace!(mode = frame.command(), kind = kind.name(), "zm record");
        Ok(record(frame, checksum_valid, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode;
    use crate::record::{CountResult, CountStatus, DeviceStatus, RecordKind};

    #[test]
    fn count_result_round_trip() {
        let result = CountResult {
            total_count: 500,
            denomination: 200,
            total_amount: 100_000,
            currency_code: "INR".into(),
            serial_number: "ZM-7".into(),
            reserved: vec![0xEE],
            error_code: 3,
            status: CountStatus::StartCounting,
        };
        let raw = encode::zm(&RecordKind::CountResult(result.clone())).unwrap();
        assert_eq!(&raw[raw.len() - 2..], &[0xA5, 0x5A]);
        let frame = Frame::parse(&raw).unwrap();
        let record = ZmDecoder::default().decode(&frame).unwrap();
        assert_eq!(record.protocol, FrameFormat::Zm);
        assert_eq!(record.kind, RecordKind::CountResult(result));
    }

    #[test]
    fn negative_temperature() {
        let status = DeviceStatus::from_flags(0x01, 0, -120);
        let raw = encode::zm(&RecordKind::DeviceStatus(status)).unwrap();
        let frame = Frame::parse(&raw).unwrap();
        let record = ZmDecoder::default().decode(&frame).unwrap();
        assert_eq!(record.kind, RecordKind::DeviceStatus(status));
    }

    #[test]
    fn sum_mismatch() {
        let mut raw = encode::zm(&RecordKind::Handshake { command: 0x01 })
            .unwrap()
            .to_vec();
        let sum_at = raw.len() - 3;
        raw[sum_at] = raw[sum_at].wrapping_add(1);
        let frame = Frame::parse(&raw).unwrap();
        assert!(matches!(
            ZmDecoder::default().decode(&frame),
            Err(DecodeError::ChecksumMismatch {
                protocol: FrameFormat::Zm,
                ..
            })
        ));
        let lenient = ZmDecoder::new(DecoderConfig {
            checksum_policy: ChecksumPolicy::Warn,
        });
        assert!(!lenient.decode(&frame).unwrap().checksum_valid);
    }

    #[test]
    fn truncated_device_status() {
        let frame = Frame::parse(&[0xAA, 0x55, 0x02, 0x00, 0x03, 0x01, 0x04, 0xA5, 0x5A]).unwrap();
        assert!(matches!(
            ZmDecoder::default().decode(&frame),
            Err(DecodeError::Truncated {
                command: 0x03,
                expected: 4,
                actual: 1,
                ..
            })
        ));
    }
}
