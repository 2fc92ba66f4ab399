//! Wire-format table: headers, length semantics and trailers.
//!
//! ```text
//! counting-machine  FD DF | 2C | 0E | 39 data bytes            | crc8  (44 total)
//! CDM               FD DF | L  | group | data                  | crc8  (L + 2 total)
//! ZM                AA 55 | N (u16 LE) | mode | data | sum8 | A5 5A  (N + 7 total)
//! ```
//!
//! CDM's `L` counts from the length byte itself to the end, inclusive. ZM's
//! `N` covers only the mode byte and the data.

use std::fmt;

use serde::Serialize;

/// Header shared by the counting-machine and CDM formats.
pub const CDM_HEADER: [u8; 2] = [0xFD, 0xDF];
/// ZM header.
pub const ZM_HEADER: [u8; 2] = [0xAA, 0x55];
/// ZM trailer.
pub const ZM_TRAILER: [u8; 2] = [0xA5, 0x5A];

/// Total length of a counting-machine frame.
pub const COUNTING_MACHINE_LEN: usize = 44;
/// Command-group byte identifying a counting-machine frame.
pub const COUNTING_MACHINE_GROUP: u8 = 0x0E;

/// Smallest CDM length byte: length + group + checksum.
const CDM_MIN_LENGTH_FIELD: usize = 3;
/// header(2) + length(2) + checksum(1) + trailer(2)
const ZM_OVERHEAD: usize = 7;

/// Every header the reassembler searches for.
pub(crate) const HEADERS: [[u8; 2]; 2] = [CDM_HEADER, ZM_HEADER];

/// One of the wire formats sharing the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    CountingMachine,
    Cdm,
    Zm,
}

/// Outcome of inspecting bytes that start with a known header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// More bytes are needed to know or reach the frame's end.
    Incomplete,
    /// A complete frame of this format and total length is buffered.
    Complete(FrameFormat, usize),
    /// The header is a false positive (implausible length or bad trailer).
    Invalid,
}

impl FrameFormat {
    /// The 2-byte header of this format.
    pub fn header(self) -> [u8; 2] {
        match self {
            Self::CountingMachine | Self::Cdm => CDM_HEADER,
            Self::Zm => ZM_HEADER,
        }
    }

    /// Stable lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::CountingMachine => "counting-machine",
            Self::Cdm => "cdm",
            Self::Zm => "zm",
        }
    }

    /// Byte offset of the first payload byte (command group or mode).
    pub(crate) fn payload_offset(self) -> usize {
        match self {
            Self::CountingMachine | Self::Cdm => 3,
            Self::Zm => 4,
        }
    }

    /// Bytes following the payload: checksum plus trailer.
    pub(crate) fn suffix_len(self) -> usize {
        match self {
            Self::CountingMachine | Self::Cdm => 1,
            Self::Zm => 3,
        }
    }

    /// Inspect `buf`, which must start with a known header, and decide
    /// whether a whole frame of at most `max_len` bytes is present.
    pub fn probe(buf: &[u8], max_len: usize) -> Probe {
        if buf.len() < 2 {
            return Probe::Incomplete;
        }
        let header = [buf[0], buf[1]];
        if header == CDM_HEADER {
            probe_fd_df(buf, max_len)
        } else if header == ZM_HEADER {
            probe_zm(buf, max_len)
        } else {
            Probe::Invalid
        }
    }
}

fn probe_fd_df(buf: &[u8], max_len: usize) -> Probe {
    // Length and group bytes decide between counting-machine and CDM.
    if buf.len() < 4 {
        return Probe::Incomplete;
    }
    let length_field = buf[2] as usize;
    let (format, total) =
        if buf[3] == COUNTING_MACHINE_GROUP && length_field == COUNTING_MACHINE_LEN {
            (FrameFormat::CountingMachine, COUNTING_MACHINE_LEN)
        } else {
            (FrameFormat::Cdm, length_field + 2)
        };

    if format == FrameFormat::Cdm && length_field < CDM_MIN_LENGTH_FIELD {
        return Probe::Invalid;
    }
    if total > max_len {
        return Probe::Invalid;
    }
    if buf.len() < total {
        return Probe::Incomplete;
    }
    Probe::Complete(format, total)
}

fn probe_zm(buf: &[u8], max_len: usize) -> Probe {
    if buf.len() < 4 {
        return Probe::Incomplete;
    }
    let declared = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    let total = declared + ZM_OVERHEAD;
    if declared == 0 || total > max_len {
        return Probe::Invalid;
    }
    if buf.len() < total {
        return Probe::Incomplete;
    }
    if buf[total - 2..total] != ZM_TRAILER {
        return Probe::Invalid;
    }
    Probe::Complete(FrameFormat::Zm, total)
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of the nearest known header in `buf`.
pub(crate) fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| HEADERS.iter().any(|h| w == h.as_slice()))
}

/// True if `byte` could be the first half of a header split across reads.
pub(crate) fn is_header_lead(byte: u8) -> bool {
    HEADERS.iter().any(|h| h[0] == byte)
}
