//! Typed decoding of counting-device frames.
//!
//! A [`DecoderRegistry`] holds the active [`Decoder`]s in registration order
//! and maps each reassembled frame to at most one [`Record`]. Records are a
//! closed set of variants ([`RecordKind`]) that consumers match
//! exhaustively.
//!
//! Checksum failures are rejected by default; [`ChecksumPolicy::Warn`]
//! passes such frames through flagged instead.

pub mod cdm;
pub mod config;
pub mod counting;
pub mod decoder;
pub mod encode;
pub mod error;
pub mod record;
pub mod registry;
pub mod zm;

mod body;

pub use cdm::CdmDecoder;
pub use config::{ChecksumPolicy, DecoderConfig};
pub use counting::CountingMachineDecoder;
pub use decoder::{Decoder, ProtocolType};
pub use error::{DecodeError, DispatchError, EncodeError, Result};
pub use record::{
    command, CountResult, CountStatus, DeviceStatus, ErrorCause, ErrorStatus, Record, RecordKind,
};
pub use registry::DecoderRegistry;
pub use zm::ZmDecoder;
