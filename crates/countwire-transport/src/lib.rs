//! Transport abstraction for counting-device links.
//!
//! The rest of countwire never touches a serial port directly. It consumes a
//! [`Transport`] that can enumerate ports and open a [`Link`], an ordered
//! byte pipe implementing `Read + Write`.
//!
//! - [`serial`]: the production implementation over the `serialport` crate
//! - [`memory`]: a scriptable in-process transport for simulators and tests
//! - [`classify`]: maps low-level failures onto a fixed, actionable taxonomy

pub mod classify;
pub mod config;
pub mod error;
pub mod memory;
pub mod serial;
pub mod traits;

pub use classify::{classify, ConnectionErrorKind};
pub use config::{DataBits, LinkConfig, Parity, StopBits, DEFAULT_BAUD_RATE};
pub use error::{Result, TransportError};
pub use memory::{MemoryHandle, MemoryLink, MemoryTransport, OpenBehavior};
pub use serial::{SerialLink, SerialTransport};
pub use traits::{Link, PortInfo, Transport};
