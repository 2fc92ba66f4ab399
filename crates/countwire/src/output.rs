use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use countwire_protocol::{Record, RecordKind};
use countwire_session::{Diagnostic, SessionEvent};
use countwire_transport::{ConnectionErrorKind, PortInfo};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One JSON line per event.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventOutput<'a> {
    Opened {
        port: &'a str,
        config: String,
    },
    Record(&'a Record),
    Dropped {
        reason: String,
        raw_data: &'a str,
    },
    Line {
        text: &'a str,
    },
    Diagnostic {
        message: String,
    },
    Error {
        error: &'a ConnectionErrorKind,
        message: &'a str,
        guidance: &'a str,
    },
    Closed {
        port: &'a str,
    },
}

impl<'a> EventOutput<'a> {
    fn from_event(event: &'a SessionEvent) -> Self {
        match event {
            SessionEvent::Opened { port, config } => Self::Opened {
                port,
                config: config.to_string(),
            },
            SessionEvent::Record(record) => Self::Record(record),
            SessionEvent::Dropped { reason, raw_hex } => Self::Dropped {
                reason: reason.to_string(),
                raw_data: raw_hex,
            },
            SessionEvent::Line(text) => Self::Line { text },
            SessionEvent::Diagnostic(diagnostic) => Self::Diagnostic {
                message: diagnostic_text(diagnostic),
            },
            SessionEvent::Error { kind, message } => Self::Error {
                error: kind,
                message,
                guidance: kind.guidance(),
            },
            SessionEvent::Closed { port } => Self::Closed { port },
        }
    }
}

pub fn print_event(event: &SessionEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&EventOutput::from_event(event))
                    .unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => match event {
            SessionEvent::Record(record) => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["TIME", "PROTOCOL", "TYPE", "DETAILS", "CHECKSUM"])
                    .add_row(vec![
                        record.timestamp.format("%H:%M:%S%.3f").to_string(),
                        record.protocol.to_string(),
                        record.kind.name().to_string(),
                        summary(&record.kind),
                        checksum_text(record).to_string(),
                    ]);
                println!("{table}");
            }
            other => println!("{}", event_line(other)),
        },
        OutputFormat::Pretty => println!("{}", event_line(event)),
        OutputFormat::Raw => match event {
            SessionEvent::Record(record) => println!("{}", record.raw_data),
            SessionEvent::Line(text) => print_raw(format!("{text}\n").as_bytes()),
            _ => {}
        },
    }
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(ports).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "VID:PID", "MANUFACTURER", "PRODUCT"]);
            for port in ports {
                table.add_row(vec![
                    port.name.clone(),
                    usb_id(port),
                    port.manufacturer.clone().unwrap_or_default(),
                    port.product.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                let usb = usb_id(port);
                if usb.is_empty() {
                    println!("{}", port.name);
                } else {
                    println!("{} ({usb})", port.name);
                }
            }
        }
        OutputFormat::Raw => {
            for port in ports {
                println!("{}", port.name);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Human-readable fields of a record.
pub fn summary(kind: &RecordKind) -> String {
    match kind {
        RecordKind::Handshake { command } => format!("command={command:#04x}"),
        RecordKind::CountResult(result) => format!(
            "status={:?} count={} denomination={} amount={} currency={} serial={} error={:#04x}",
            result.status,
            result.total_count,
            result.denomination,
            result.total_amount,
            result.currency_code,
            result.serial_number,
            result.error_code
        ),
        RecordKind::DeviceStatus(status) => format!(
            "online={} ready={} counting={} error={} mode={} temperature={:.1}C",
            status.online,
            status.ready,
            status.counting,
            status.error,
            status.mode,
            status.temperature_celsius()
        ),
        RecordKind::ErrorStatus(status) => {
            let causes: Vec<String> = status
                .causes()
                .iter()
                .map(|cause| format!("{cause:?}"))
                .collect();
            format!("mask={:#06x} causes=[{}]", status.mask, causes.join(","))
        }
    }
}

fn event_line(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Opened { port, config } => format!("opened {port} at {config}"),
        SessionEvent::Record(record) => format!(
            "{} {} {} {}{}",
            record.timestamp.format("%H:%M:%S%.3f"),
            record.protocol,
            record.kind.name(),
            summary(&record.kind),
            if record.checksum_valid {
                ""
            } else {
                " [checksum mismatch]"
            }
        ),
        SessionEvent::Dropped { reason, raw_hex } => format!("dropped {raw_hex}: {reason}"),
        SessionEvent::Line(text) => text.clone(),
        SessionEvent::Diagnostic(diagnostic) => diagnostic_text(diagnostic),
        SessionEvent::Error { kind, message } => {
            format!("error: {kind}: {message} ({})", kind.guidance())
        }
        SessionEvent::Closed { port } => format!("closed {port}"),
    }
}

fn diagnostic_text(diagnostic: &Diagnostic) -> String {
    match diagnostic {
        Diagnostic::StaleBufferPurged { discarded } => {
            format!("discarded {discarded} stale bytes of an incomplete frame")
        }
        Diagnostic::LineOverflow { discarded } => {
            format!("discarded {discarded} bytes of an unterminated line")
        }
    }
}

fn checksum_text(record: &Record) -> &'static str {
    if record.checksum_valid {
        "ok"
    } else {
        "MISMATCH"
    }
}

fn usb_id(port: &PortInfo) -> String {
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use countwire_protocol::{CountResult, CountStatus, ErrorStatus};

    use super::*;

    #[test]
    fn count_result_summary_lists_fields() {
        let text = summary(&RecordKind::CountResult(CountResult {
            total_count: 100,
            currency_code: "EUR".to_string(),
            status: CountStatus::Completed,
            ..CountResult::default()
        }));
        assert!(text.starts_with("status=Completed count=100"));
        assert!(text.contains("currency=EUR"));
    }

    #[test]
    fn error_summary_names_causes() {
        let text = summary(&RecordKind::ErrorStatus(ErrorStatus { mask: 0x0011 }));
        assert_eq!(text, "mask=0x0011 causes=[DoubleNote,Jam]");
    }

    #[test]
    fn error_event_json_carries_guidance() {
        let event = SessionEvent::Error {
            kind: ConnectionErrorKind::PortBusy,
            message: "busy".to_string(),
        };
        let json = serde_json::to_value(EventOutput::from_event(&event)).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["error"]["kind"], "port_busy");
        assert!(json["guidance"].as_str().unwrap().contains("close other"));
    }
}
