use std::fs::File;
use std::io::BufReader;

use countwire_frame::{Frame, FrameError, FrameReader, Reassembler, ReassemblyState};
use countwire_protocol::{
    encode, CountResult, CountStatus, DecoderConfig, DecoderRegistry, DeviceStatus, EncodeError,
    ErrorStatus, RecordKind,
};
use countwire_session::SessionEvent;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Demo fragment size; small enough that every frame spans several chunks.
const DEMO_CHUNK: usize = 7;

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = DecoderRegistry::with_default_decoders(DecoderConfig {
        checksum_policy: args.checksum,
    });

    let frames = if let Some(path) = &args.file {
        read_capture(path)?
    } else {
        let chunks = if args.demo {
            demo_chunks()?
        } else {
            args.hex
                .iter()
                .map(|chunk| parse_hex(chunk))
                .collect::<CliResult<Vec<_>>>()?
        };
        reassemble(&chunks)
    };

    let mut records = 0usize;
    for frame in &frames {
        let event = match registry.dispatch_detailed(frame) {
            Ok(record) => {
                records += 1;
                SessionEvent::Record(record)
            }
            Err(reason) => SessionEvent::Dropped {
                reason,
                raw_hex: frame.raw_hex(),
            },
        };
        print_event(&event, format);
    }

    tracing::debug!(frames = frames.len(), records, "decode finished");
    if records == 0 {
        return Err(CliError::new(DATA_INVALID, "no records decoded"));
    }
    Ok(SUCCESS)
}

fn reassemble(chunks: &[Vec<u8>]) -> Vec<Frame> {
    let reassembler = Reassembler::default();
    let mut state = ReassemblyState::new();
    let frames: Vec<Frame> = chunks
        .iter()
        .flat_map(|chunk| reassembler.accept(&mut state, chunk))
        .collect();
    if state.buffered() > 0 {
        tracing::warn!(len = state.buffered(), "input ended inside a frame");
    }
    frames
}

fn read_capture(path: &std::path::Path) -> CliResult<Vec<Frame>> {
    let context = format!("cannot read {}", path.display());
    let file = File::open(path).map_err(|err| io_error(&context, err))?;
    let mut reader = FrameReader::new(BufReader::new(file));
    let mut frames = Vec::new();
    loop {
        match reader.read_frame() {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => continue,
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error(&context, err)),
        }
    }
    Ok(frames)
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex '{input}': {err}")))
}

/// A noisy, fragmented stream with one frame of each format and one
/// corrupted frame.
fn demo_chunks() -> CliResult<Vec<Vec<u8>>> {
    let count = encode::counting_machine(&CountResult {
        total_count: 100,
        denomination: 50,
        total_amount: 5000,
        currency_code: "EUR".to_string(),
        serial_number: "AB12345678".to_string(),
        reserved: Vec::new(),
        error_code: 0,
        status: CountStatus::Completed,
    });
    let status = encode::cdm(&RecordKind::DeviceStatus(DeviceStatus::from_flags(
        0b0011, 1, 235,
    )));
    let errors = encode::zm(&RecordKind::ErrorStatus(ErrorStatus { mask: 0x0011 }));

    let mut stream = vec![0x00, 0x13, 0x37];
    for frame in [count, status, errors] {
        stream.extend_from_slice(&frame.map_err(demo_error)?);
    }
    // Frames cleanly but fails its CRC.
    let mut broken = encode::cdm(&RecordKind::Handshake { command: 0x01 })
        .map_err(demo_error)?
        .to_vec();
    let last = broken.len() - 1;
    broken[last] ^= 0xFF;
    stream.extend_from_slice(&broken);

    Ok(stream.chunks(DEMO_CHUNK).map(<[u8]>::to_vec).collect())
}

fn demo_error(err: EncodeError) -> CliError {
    CliError::new(INTERNAL, format!("demo encoding failed: {err}"))
}
