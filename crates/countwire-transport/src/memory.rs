//! In-process transport with a scriptable device side.
//!
//! [`MemoryTransport`] stands in for a serial driver: the device end
//! ([`MemoryHandle`]) pushes byte chunks that the open [`MemoryLink`] reads
//! back in order, and captures everything the link writes.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::config::LinkConfig;
use crate::error::{Result, TransportError};
use crate::traits::{Link, PortInfo, Transport};

/// How the next `open` call behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Open immediately.
    Succeed,
    /// Fail with an I/O error of this kind and message.
    Fail(ErrorKind, String),
    /// Block for the given duration, then open.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct Device {
    ports: Vec<String>,
    script: VecDeque<OpenBehavior>,
    open_attempts: usize,
    inbound: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    unplugged: bool,
    fail_writes: bool,
    open_links: usize,
}

fn lock(device: &Mutex<Device>) -> MutexGuard<'_, Device> {
    device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport exposing a fixed set of port names.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    device: Arc<Mutex<Device>>,
}

impl MemoryTransport {
    /// Create a transport that enumerates the given port names.
    pub fn new<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let device = Device {
            ports: ports.into_iter().map(Into::into).collect(),
            ..Device::default()
        };
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Queue behaviours for subsequent `open` calls. Once the script runs
    /// out, opens succeed.
    pub fn script_opens(&self, behaviors: impl IntoIterator<Item = OpenBehavior>) {
        lock(&self.device).script.extend(behaviors);
    }

    /// The device side of this transport.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            device: Arc::clone(&self.device),
        }
    }
}

impl Transport for MemoryTransport {
    type Link = MemoryLink;

    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(lock(&self.device)
            .ports
            .iter()
            .map(PortInfo::named)
            .collect())
    }

    fn open(&self, port: &str, config: &LinkConfig) -> Result<MemoryLink> {
        config.validate()?;
        let behavior = {
            let mut device = lock(&self.device);
            device.open_attempts += 1;
            if !device.ports.iter().any(|p| p == port) {
                return Err(TransportError::Open {
                    port: port.to_string(),
                    source: std::io::Error::new(ErrorKind::NotFound, "no such port"),
                });
            }
            device.script.pop_front().unwrap_or(OpenBehavior::Succeed)
        };

        match behavior {
            OpenBehavior::Succeed => {}
            OpenBehavior::Fail(kind, message) => {
                return Err(TransportError::Open {
                    port: port.to_string(),
                    source: std::io::Error::new(kind, message),
                });
            }
            OpenBehavior::Delay(delay) => std::thread::sleep(delay),
        }

        let mut device = lock(&self.device);
        device.open_links += 1;
        device.unplugged = false;
        debug!(port, "memory link opened");
        Ok(MemoryLink {
            name: port.to_string(),
            device: Arc::clone(&self.device),
        })
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

/// Host end of an in-memory link.
#[derive(Debug)]
pub struct MemoryLink {
    name: String,
    device: Arc<Mutex<Device>>,
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut device = lock(&self.device);
        if device.unplugged {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "device unplugged"));
        }
        let Some(mut chunk) = device.inbound.pop_front() else {
            return Err(std::io::Error::from(ErrorKind::TimedOut));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            device.inbound.push_front(chunk);
        }
        Ok(n)
    }
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut device = lock(&self.device);
        if device.unplugged {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "device unplugged"));
        }
        if device.fail_writes {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "write timed out"));
        }
        device.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Link for MemoryLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn discard_input(&mut self) -> Result<()> {
        lock(&self.device).inbound.clear();
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        let mut device = lock(&self.device);
        device.open_links = device.open_links.saturating_sub(1);
    }
}

/// Device end of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    device: Arc<Mutex<Device>>,
}

impl MemoryHandle {
    /// Queue a chunk for the host to read.
    pub fn push(&self, chunk: impl Into<Vec<u8>>) {
        lock(&self.device).inbound.push_back(chunk.into());
    }

    /// Take everything the host has written so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.device).written)
    }

    /// Make every subsequent read/write fail as if the cable was pulled.
    pub fn unplug(&self) {
        lock(&self.device).unplugged = true;
    }

    /// Make writes fail with a timeout.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.device).fail_writes = fail;
    }

    /// Add or remove a port from enumeration.
    pub fn set_ports<I, S>(&self, ports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.device).ports = ports.into_iter().map(Into::into).collect();
    }

    /// Number of `open` calls seen so far.
    pub fn open_attempts(&self) -> usize {
        lock(&self.device).open_attempts
    }

    /// Number of links currently open.
    pub fn open_links(&self) -> usize {
        lock(&self.device).open_links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pushed_chunks_in_order() {
        let transport = MemoryTransport::new(["SIM0"]);
        let handle = transport.handle();
        let mut link = transport.open("SIM0", &LinkConfig::default()).unwrap();

        handle.push(vec![1, 2, 3]);
        handle.push(vec![4]);

        let mut buf = [0u8; 2];
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(link.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(link.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);

        let err = link.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn captures_writes() {
        let transport = MemoryTransport::new(["SIM0"]);
        let handle = transport.handle();
        let mut link = transport.open("SIM0", &LinkConfig::default()).unwrap();

        link.write_all(b"\xFD\xDF").unwrap();
        assert_eq!(handle.take_written(), vec![0xFD, 0xDF]);
        assert!(handle.take_written().is_empty());
    }

    #[test]
    fn scripted_failures_then_success() {
        let transport = MemoryTransport::new(["SIM0"]);
        transport.script_opens([OpenBehavior::Fail(ErrorKind::ResourceBusy, "busy".into())]);

        let err = transport.open("SIM0", &LinkConfig::default()).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(transport.open("SIM0", &LinkConfig::default()).is_ok());
        assert_eq!(transport.handle().open_attempts(), 2);
    }

    #[test]
    fn unknown_port_is_not_found() {
        let transport = MemoryTransport::new(["SIM0"]);
        let err = transport.open("SIM9", &LinkConfig::default()).unwrap_err();
        match err {
            TransportError::Open { source, .. } => assert_eq!(source.kind(), ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unplug_breaks_io_and_drop_releases_link() {
        let transport = MemoryTransport::new(["SIM0"]);
        let handle = transport.handle();
        let mut link = transport.open("SIM0", &LinkConfig::default()).unwrap();
        assert_eq!(handle.open_links(), 1);

        handle.unplug();
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap_err().kind(), ErrorKind::BrokenPipe);
        assert_eq!(link.write(b"x").unwrap_err().kind(), ErrorKind::BrokenPipe);

        drop(link);
        assert_eq!(handle.open_links(), 0);
    }
}
