use countwire_transport::{SerialTransport, Transport};

use crate::cmd::PortsArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_ports, OutputFormat};

pub fn run(_args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports = SerialTransport::new()
        .available_ports()
        .map_err(|err| transport_error("port enumeration failed", err))?;
    tracing::debug!(count = ports.len(), "ports enumerated");
    print_ports(&ports, format);
    Ok(SUCCESS)
}
