use countwire_transport::{classify, Link, LinkConfig, PortInfo, SerialTransport, Transport};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let transport = SerialTransport::new();
    let mut checks = vec![compiled_features_check()];

    let ports = match transport.available_ports() {
        Ok(ports) => {
            checks.push(enumeration_check(transport.transport_name(), &ports));
            ports
        }
        Err(err) => {
            checks.push(CheckResult {
                name: "port_enumeration".to_string(),
                status: CheckStatus::Fail,
                detail: format!("{err} ({})", classify(&err).guidance()),
            });
            Vec::new()
        }
    };

    if args.probe {
        checks.extend(ports.iter().map(|port| access_check(&transport, port)));
    } else {
        checks.push(CheckResult {
            name: "port_access".to_string(),
            status: CheckStatus::Skip,
            detail: "pass --probe to try opening each port".to_string(),
        });
    }

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("countwire doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<28} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn enumeration_check(transport: &str, ports: &[PortInfo]) -> CheckResult {
    if ports.is_empty() {
        return CheckResult {
            name: "port_enumeration".to_string(),
            status: CheckStatus::Warn,
            detail: format!("no {transport} ports found; check the cable and driver"),
        };
    }
    let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
    CheckResult {
        name: "port_enumeration".to_string(),
        status: CheckStatus::Pass,
        detail: format!("{} {transport} port(s): {}", ports.len(), names.join(", ")),
    }
}

fn access_check<T: Transport>(transport: &T, port: &PortInfo) -> CheckResult {
    let name = format!("port_access {}", port.name);
    match transport.open(&port.name, &LinkConfig::default()) {
        Ok(link) => CheckResult {
            name,
            status: CheckStatus::Pass,
            detail: format!("opened {} at {}", link.port_name(), LinkConfig::default()),
        },
        Err(err) => {
            let kind = classify(&err);
            CheckResult {
                name,
                status: CheckStatus::Fail,
                detail: format!("{kind}: {}", kind.guidance()),
            }
        }
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "session") {
        features.push("session");
    }
    if cfg!(feature = "async") {
        features.push("async");
    }
    if cfg!(feature = "cli") {
        features.push("cli");
    }

    CheckResult {
        name: "compiled_features".to_string(),
        status: CheckStatus::Info,
        detail: features.join(", "),
    }
}
