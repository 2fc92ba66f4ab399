//! Byte-stream reassembly for counting-device wire protocols.
//!
//! Three wire formats share one serial link:
//! - counting-machine: `FD DF`, fixed 44-byte frames, CRC-8
//! - CDM: `FD DF`, variable length counted from the length byte, CRC-8
//! - ZM: `AA 55`, little-endian payload length, additive checksum, `A5 5A` trailer
//!
//! The [`Reassembler`] turns arbitrarily chunked bytes into complete
//! [`Frame`]s: it resynchronises on noise, waits on partial frames, splits
//! coalesced ones and purges buffers that stall mid-frame.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod reader;
pub mod reassembler;

#[cfg(feature = "async")]
pub mod async_codec;

pub use checksum::{crc8, crc8_with_poly, sum8, xor8, CRC8_POLY};
pub use codec::{encode_frame, Frame};
pub use error::{FrameError, Result};
pub use format::{FrameFormat, Probe, CDM_HEADER, COUNTING_MACHINE_LEN, ZM_HEADER, ZM_TRAILER};
pub use reader::FrameReader;
pub use reassembler::{
    Reassembler, ReassemblerConfig, ReassemblyState, ReassemblyStats, DEFAULT_MAX_FRAME_LEN,
    DEFAULT_STALE_AFTER,
};

#[cfg(feature = "async")]
pub use async_codec::CountwireCodec;
