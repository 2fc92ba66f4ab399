//! Command data layouts shared by the CDM and ZM formats (big-endian).

use bytes::{Buf, BufMut, BytesMut};
use countwire_frame::FrameFormat;

use crate::error::{DecodeError, EncodeError, Result};
use crate::record::{command, CountResult, CountStatus, DeviceStatus, ErrorStatus, RecordKind};

pub(crate) const CURRENCY_LEN: usize = 4;
pub(crate) const SERIAL_LEN: usize = 11;

const COUNT_RESULT_LEN: usize = 1 + 4 + 4 + 8 + CURRENCY_LEN + SERIAL_LEN + 1;
const DEVICE_STATUS_LEN: usize = 4;
const ERROR_STATUS_LEN: usize = 2;

/// Decode the data following a command byte.
pub(crate) fn decode(protocol: FrameFormat, cmd: u8, data: &[u8]) -> Result<RecordKind> {
    let required = match cmd {
        command::HANDSHAKE => 0,
        command::COUNT_RESULT => COUNT_RESULT_LEN,
        command::DEVICE_STATUS => DEVICE_STATUS_LEN,
        command::ERROR_STATUS => ERROR_STATUS_LEN,
        other => {
            return Err(DecodeError::UnsupportedCommand {
                protocol,
                command: other,
            })
        }
    };
    if data.len() < required {
        return Err(DecodeError::Truncated {
            protocol,
            command: cmd,
            expected: required,
            actual: data.len(),
        });
    }

    let mut buf = data;
    let kind = match cmd {
        command::HANDSHAKE => RecordKind::Handshake { command: cmd },
        command::COUNT_RESULT => {
            let status = CountStatus::try_from(buf.get_u8())?;
            let total_count = buf.get_u32();
            let denomination = buf.get_u32();
            let total_amount = buf.get_u64();
            let currency_code = ascii_field(&mut buf, CURRENCY_LEN);
            let serial_number = ascii_field(&mut buf, SERIAL_LEN);
            let error_code = buf.get_u8();
            RecordKind::CountResult(CountResult {
                total_count,
                denomination,
                total_amount,
                currency_code,
                serial_number,
                reserved: buf.to_vec(),
                error_code,
                status,
            })
        }
        command::DEVICE_STATUS => {
            let flags = buf.get_u8();
            let mode = buf.get_u8();
            let temperature = buf.get_i16();
            RecordKind::DeviceStatus(DeviceStatus::from_flags(flags, mode, temperature))
        }
        _ => RecordKind::ErrorStatus(ErrorStatus { mask: buf.get_u16() }),
    };
    Ok(kind)
}

/// Encode a record as command byte plus data.
pub(crate) fn encode(kind: &RecordKind, dst: &mut BytesMut) -> std::result::Result<(), EncodeError> {
    match kind {
        RecordKind::Handshake { command } => dst.put_u8(*command),
        RecordKind::CountResult(result) => {
            dst.put_u8(command::COUNT_RESULT);
            dst.put_u8(result.status as u8);
            dst.put_u32(result.total_count);
            dst.put_u32(result.denomination);
            dst.put_u64(result.total_amount);
            put_ascii(dst, "currency code", &result.currency_code, CURRENCY_LEN)?;
            put_ascii(dst, "serial number", &result.serial_number, SERIAL_LEN)?;
            dst.put_u8(result.error_code);
            dst.put_slice(&result.reserved);
        }
        RecordKind::DeviceStatus(status) => {
            dst.put_u8(command::DEVICE_STATUS);
            dst.put_u8(status.flags());
            dst.put_u8(status.mode);
            dst.put_i16(status.temperature);
        }
        RecordKind::ErrorStatus(status) => {
            dst.put_u8(command::ERROR_STATUS);
            dst.put_u16(status.mask);
        }
    }
    Ok(())
}

/// Read a fixed-width ASCII field, dropping trailing zero padding.
pub(crate) fn ascii_field(buf: &mut &[u8], width: usize) -> String {
    let slice: &[u8] = *buf;
    let field = &slice[..width];
    buf.advance(width);
    let end = field.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Write `value` zero-padded to `width` bytes.
pub(crate) fn put_ascii(
    dst: &mut BytesMut,
    field: &'static str,
    value: &str,
    width: usize,
) -> std::result::Result<(), EncodeError> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(EncodeError::FieldTooLong {
            field,
            max: width,
            actual: bytes.len(),
        });
    }
    dst.put_slice(bytes);
    dst.put_bytes(0, width - bytes.len());
    Ok(())
}
