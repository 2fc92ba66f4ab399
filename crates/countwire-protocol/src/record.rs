use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::decoder::ProtocolType;
use crate::error::DecodeError;

/// Command-group (CDM) and mode (ZM) codes.
pub mod command {
    pub const HANDSHAKE: u8 = 0x01;
    pub const COUNT_RESULT: u8 = 0x02;
    pub const DEVICE_STATUS: u8 = 0x03;
    pub const ERROR_STATUS: u8 = 0x04;
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub protocol: ProtocolType,
    /// Uppercase hex of the frame this record came from.
    pub raw_data: String,
    /// `false` only when a mismatching frame was let through by
    /// `ChecksumPolicy::Warn`.
    pub checksum_valid: bool,
    pub kind: RecordKind,
}

/// The closed set of record shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    Handshake { command: u8 },
    CountResult(CountResult),
    DeviceStatus(DeviceStatus),
    ErrorStatus(ErrorStatus),
}

impl RecordKind {
    /// Stable lowercase name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::CountResult(_) => "count_result",
            Self::DeviceStatus(_) => "device_status",
            Self::ErrorStatus(_) => "error_status",
        }
    }
}

/// Outcome of a counting run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountResult {
    pub total_count: u32,
    pub denomination: u32,
    pub total_amount: u64,
    /// Up to 4 ASCII characters.
    pub currency_code: String,
    /// Up to 11 ASCII characters.
    pub serial_number: String,
    pub reserved: Vec<u8>,
    pub error_code: u8,
    pub status: CountStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CountStatus {
    #[default]
    StartCounting = 0x00,
    Counting = 0x01,
    Completed = 0x02,
    CompletedFull = 0x03,
}

impl TryFrom<u8> for CountStatus {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::StartCounting),
            0x01 => Ok(Self::Counting),
            0x02 => Ok(Self::Completed),
            0x03 => Ok(Self::CompletedFull),
            other => Err(DecodeError::InvalidField {
                field: "count status",
                value: other,
            }),
        }
    }
}

/// Device health snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub online: bool,
    pub ready: bool,
    pub counting: bool,
    pub error: bool,
    pub mode: u8,
    /// Tenths of a degree Celsius.
    pub temperature: i16,
}

const FLAG_ONLINE: u8 = 0x01;
const FLAG_READY: u8 = 0x02;
const FLAG_COUNTING: u8 = 0x04;
const FLAG_ERROR: u8 = 0x08;

impl DeviceStatus {
    /// Unpack the status flag byte.
    pub fn from_flags(flags: u8, mode: u8, temperature: i16) -> Self {
        Self {
            online: flags & FLAG_ONLINE != 0,
            ready: flags & FLAG_READY != 0,
            counting: flags & FLAG_COUNTING != 0,
            error: flags & FLAG_ERROR != 0,
            mode,
            temperature,
        }
    }

    /// Pack the booleans back into the wire flag byte.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.online {
            flags |= FLAG_ONLINE;
        }
        if self.ready {
            flags |= FLAG_READY;
        }
        if self.counting {
            flags |= FLAG_COUNTING;
        }
        if self.error {
            flags |= FLAG_ERROR;
        }
        flags
    }

    pub fn temperature_celsius(&self) -> f32 {
        f32::from(self.temperature) / 10.0
    }
}

/// Error-cause bitmask reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStatus {
    pub mask: u16,
}

/// Names for error-mask bits 0-9. These are a working assignment; devices
/// may number their causes differently, so `ErrorStatus::mask` always keeps
/// the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
    DoubleNote,
    ChainNote,
    HalfNote,
    Counterfeit,
    Jam,
    SensorFault,
    HopperEmpty,
    StackerFull,
    MotorFault,
    CoverOpen,
    /// A set bit with no assigned meaning.
    Other(u8),
}

impl ErrorCause {
    fn from_bit(bit: u8) -> Self {
        match bit {
            0 => Self::DoubleNote,
            1 => Self::ChainNote,
            2 => Self::HalfNote,
            3 => Self::Counterfeit,
            4 => Self::Jam,
            5 => Self::SensorFault,
            6 => Self::HopperEmpty,
            7 => Self::StackerFull,
            8 => Self::MotorFault,
            9 => Self::CoverOpen,
            other => Self::Other(other),
        }
    }
}

impl ErrorStatus {
    /// Set causes, lowest bit first.
    pub fn causes(&self) -> Vec<ErrorCause> {
        (0..16u8)
            .filter(|bit| self.mask & (1 << bit) != 0)
            .map(ErrorCause::from_bit)
            .collect()
    }

    pub fn is_clear(&self) -> bool {
        self.mask == 0
    }
}
