use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use countwire_frame::ReassemblerConfig;
use countwire_protocol::DecoderConfig;
use countwire_session::{ReceiveMode, Session, SessionConfig, SessionEvent};
use countwire_transport::{LinkConfig, SerialTransport};

use crate::cmd::{parse_duration, MonitorArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let link = LinkConfig {
        baud_rate: args.baud,
        data_bits: args.data_bits,
        stop_bits: args.stop_bits,
        parity: args.parity,
    };
    let config = SessionConfig {
        open_timeout: parse_duration(&args.open_timeout)?,
        reassembler: ReassemblerConfig {
            stale_after: parse_duration(&args.stale_after)?,
            ..ReassemblerConfig::default()
        },
        decoder: DecoderConfig {
            checksum_policy: args.checksum,
        },
        ..SessionConfig::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (mut session, events) = Session::with_config(SerialTransport::new(), config);
    session
        .connect(&args.port, link, args.retries)
        .map_err(|err| session_error(&format!("cannot open {}", args.port), err))?;
    tracing::debug!(decoders = ?session.registry().decoders(), "decoding");
    if args.lines {
        session
            .set_mode(ReceiveMode::Lines)
            .map_err(|err| session_error("mode switch failed", err))?;
    }

    let mut printed = 0usize;
    flush_events(&events, format, args.count, &mut printed);

    while running.load(Ordering::SeqCst) {
        let polled = session.poll();
        flush_events(&events, format, args.count, &mut printed);
        if let Err(err) = polled {
            return Err(session_error(&format!("lost {}", args.port), err));
        }
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    session.disconnect();
    tracing::info!(
        stats = ?session.stats(),
        reassembly = ?session.reassembly_stats(),
        "monitor finished"
    );
    Ok(SUCCESS)
}

/// Print queued events up to the record limit. Error events are skipped:
/// they come back as the command's own exit error.
fn flush_events(
    events: &Receiver<SessionEvent>,
    format: OutputFormat,
    limit: Option<usize>,
    printed: &mut usize,
) {
    for event in events.try_iter() {
        match &event {
            SessionEvent::Error { .. } => continue,
            SessionEvent::Record(_) | SessionEvent::Line(_) => {
                if limit.is_some_and(|limit| *printed >= limit) {
                    continue;
                }
                *printed += 1;
            }
            _ => {}
        }
        print_event(&event, format);
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
