use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, FlowControl, SerialPort, SerialPortInfo, SerialPortType};
use tracing::{debug, info};

use crate::config::{DataBits, LinkConfig, Parity, StopBits};
use crate::error::{Result, TransportError};
use crate::traits::{Link, PortInfo, Transport};

/// Serial-port transport backed by the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    io_timeout: Duration,
}

impl SerialTransport {
    /// Default bound on a single read or write.
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self::with_io_timeout(Self::DEFAULT_IO_TIMEOUT)
    }

    /// Use an explicit per-operation read/write timeout.
    pub fn with_io_timeout(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SerialTransport {
    type Link = SerialLink;

    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        let mut ports: Vec<PortInfo> = serialport::available_ports()
            .map_err(|err| TransportError::Enumerate(err.to_string()))?
            .into_iter()
            .map(PortInfo::from)
            .collect();
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ports)
    }

    fn open(&self, port: &str, config: &LinkConfig) -> Result<SerialLink> {
        config.validate()?;
        let builder = serialport::new(port, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity)?)
            .stop_bits(stop_bits(config.stop_bits)?)
            .flow_control(FlowControl::None)
            .timeout(self.io_timeout);

        let inner = builder.open().map_err(|err| TransportError::Open {
            port: port.to_string(),
            source: err.into(),
        })?;

        info!(port, settings = %config, "opened serial port");
        Ok(SerialLink {
            inner,
            name: port.to_string(),
        })
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

/// An open serial port.
pub struct SerialLink {
    inner: Box<dyn SerialPort>,
    name: String,
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Link for SerialLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn discard_input(&mut self) -> Result<()> {
        self.inner
            .clear(ClearBuffer::Input)
            .map_err(|err| TransportError::Io(err.into()))
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        debug!(port = %self.name, "closing serial port");
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").field("port", &self.name).finish()
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::named(info.port_name),
        }
    }
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

// serialport exposes neither 1.5 stop bits nor mark/space parity.
fn stop_bits(bits: StopBits) -> Result<serialport::StopBits> {
    match bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(TransportError::UnsupportedConfig(
            "1.5 stop bits are not supported by the serial driver".to_string(),
        )),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Mark | Parity::Space => Err(TransportError::UnsupportedConfig(format!(
            "{parity:?} parity is not supported by the serial driver"
        ))),
    }
}
