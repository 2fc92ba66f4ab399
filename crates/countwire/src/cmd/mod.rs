use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use countwire_protocol::ChecksumPolicy;
use countwire_transport::{DataBits, Parity, StopBits};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod doctor;
pub mod monitor;
pub mod ports;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports.
    Ports(PortsArgs),
    /// Connect to a device and print decoded records.
    Monitor(MonitorArgs),
    /// Decode captured bytes (hex arguments, a binary file, or a built-in demo).
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Check serial port enumeration and access.
    Doctor(DoctorArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ports(args) => ports::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format),
    }
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Serial port to open (e.g. /dev/ttyUSB0, COM3).
    pub port: String,
    /// Baud rate.
    #[arg(long, default_value_t = countwire_transport::DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Data bits (5-8).
    #[arg(long, default_value = "8")]
    pub data_bits: DataBits,
    /// Stop bits (1, 1.5, 2).
    #[arg(long, default_value = "1")]
    pub stop_bits: StopBits,
    /// Parity (none, even, odd, mark, space).
    #[arg(long, default_value = "none")]
    pub parity: Parity,
    /// Extra open attempts after the first failure.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print text lines instead of decoding frames.
    #[arg(long)]
    pub lines: bool,
    /// What to do with frames whose checksum does not match (reject, warn).
    #[arg(long, default_value = "reject")]
    pub checksum: ChecksumPolicy,
    /// Bound on a single open attempt (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub open_timeout: String,
    /// Discard a partial frame idle for this long (e.g. 1000ms).
    #[arg(long, default_value = "1000ms")]
    pub stale_after: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex chunks, fed to the reassembler in order (spaces and colons ignored).
    #[arg(conflicts_with_all = ["file", "demo"], required_unless_present_any = ["file", "demo"])]
    pub hex: Vec<String>,
    /// Read a raw binary capture.
    #[arg(long, value_name = "PATH", conflicts_with = "demo")]
    pub file: Option<PathBuf>,
    /// Decode a built-in fragmented stream covering all three formats.
    #[arg(long)]
    pub demo: bool,
    /// What to do with frames whose checksum does not match (reject, warn).
    #[arg(long, default_value = "reject")]
    pub checksum: ChecksumPolicy,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Also try opening every enumerated port.
    #[arg(long)]
    pub probe: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
