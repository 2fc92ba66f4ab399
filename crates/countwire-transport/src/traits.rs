use std::io::{Read, Write};

use serde::Serialize;

use crate::config::LinkConfig;
use crate::error::Result;

/// An open, ordered byte pipe to a device, readable and writable.
///
/// Reads are expected to be bounded: an implementation returns
/// `ErrorKind::TimedOut` (or `WouldBlock`) when no bytes arrived within its
/// read timeout instead of blocking indefinitely.
pub trait Link: Read + Write + Send {
    /// Port identifier this link was opened on.
    fn port_name(&self) -> &str;

    /// Drop any bytes buffered by the driver but not yet read.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Something that can enumerate ports and open links on them.
pub trait Transport: Send + Sync + 'static {
    type Link: Link + 'static;

    /// Ports currently visible to this transport.
    fn available_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open `port` with the given line settings (blocking).
    fn open(&self, port: &str, config: &LinkConfig) -> Result<Self::Link>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// Information about an enumerable port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g. `/dev/ttyUSB0` or `COM3`).
    pub name: String,
    /// USB vendor ID, if a USB device.
    pub vid: Option<u16>,
    /// USB product ID, if a USB device.
    pub pid: Option<u16>,
    /// Manufacturer string, if reported.
    pub manufacturer: Option<String>,
    /// Product string, if reported.
    pub product: Option<String>,
}

impl PortInfo {
    /// A port known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}
