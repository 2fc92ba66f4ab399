//! Build wire frames from records, for simulators, demos and tests.

use bytes::{BufMut, Bytes, BytesMut};
use countwire_frame::{encode_frame, FrameFormat};

use crate::body::{self, put_ascii, CURRENCY_LEN, SERIAL_LEN};
use crate::counting::{GROUP, RESERVED_LEN};
use crate::error::EncodeError;
use crate::record::{CountResult, RecordKind};

type Result<T> = std::result::Result<T, EncodeError>;

/// Encode a 44-byte counting-machine frame (little-endian fields).
pub fn counting_machine(result: &CountResult) -> Result<Bytes> {
    if result.reserved.len() > RESERVED_LEN {
        return Err(EncodeError::FieldTooLong {
            field: "reserved",
            max: RESERVED_LEN,
            actual: result.reserved.len(),
        });
    }
    let mut payload = BytesMut::with_capacity(40);
    payload.put_u8(GROUP);
    payload.put_u8(result.status as u8);
    payload.put_u32_le(result.total_count);
    payload.put_u32_le(result.denomination);
    payload.put_u64_le(result.total_amount);
    put_ascii(&mut payload, "currency code", &result.currency_code, CURRENCY_LEN)?;
    put_ascii(&mut payload, "serial number", &result.serial_number, SERIAL_LEN)?;
    payload.put_slice(&result.reserved);
    payload.put_bytes(0, RESERVED_LEN - result.reserved.len());
    payload.put_u8(result.error_code);

    let mut dst = BytesMut::new();
    encode_frame(FrameFormat::CountingMachine, &payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode a CDM frame.
pub fn cdm(kind: &RecordKind) -> Result<Bytes> {
    framed(FrameFormat::Cdm, kind)
}

/// Encode a ZM frame.
pub fn zm(kind: &RecordKind) -> Result<Bytes> {
    framed(FrameFormat::Zm, kind)
}

/// Encode `kind` in any format. Counting-machine frames only carry count
/// results.
pub fn encode(protocol: FrameFormat, kind: &RecordKind) -> Result<Bytes> {
    match (protocol, kind) {
        (FrameFormat::CountingMachine, RecordKind::CountResult(result)) => {
            counting_machine(result)
        }
        (FrameFormat::CountingMachine, other) => Err(EncodeError::Unsupported {
            protocol,
            kind: other.name(),
        }),
        (format, kind) => framed(format, kind),
    }
}

fn framed(format: FrameFormat, kind: &RecordKind) -> Result<Bytes> {
    let mut payload = BytesMut::new();
    body::encode(kind, &mut payload)?;
    let mut dst = BytesMut::new();
    encode_frame(format, &payload, &mut dst)?;
    Ok(dst.freeze())
}
