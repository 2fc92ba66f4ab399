//! Monitoring and decoding for currency-counting devices on a serial link.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial and in-memory links, failure classification
//! - [`frame`]: checksums and byte-stream reassembly for the three wire formats
//! - [`protocol`]: typed records, decoders and the decoder registry
//! - [`session`]: connection state machine (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use countwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use countwire_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use countwire_protocol::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use countwire_session::*;
}
