use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use countwire_frame::{Reassembler, ReassemblyState, ReassemblyStats};
use countwire_protocol::DecoderRegistry;
use countwire_transport::{
    classify, ConnectionErrorKind, Link, LinkConfig, Transport, TransportError,
};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::event::{Diagnostic, ReceiveMode, SessionEvent};
use crate::state::ConnectionState;

/// Counters accumulated over the life of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub connects: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub frames: u64,
    pub records: u64,
    pub dropped: u64,
}

/// One managed connection to a counting device.
///
/// All operations take `&mut self`, so byte handling, writes and lifecycle
/// changes for a session never overlap. Outcomes are reported on the event
/// channel returned by the constructor.
pub struct Session<T: Transport> {
    transport: Arc<T>,
    registry: DecoderRegistry,
    config: SessionConfig,
    reassembler: Reassembler,
    reassembly: ReassemblyState,
    line_buffer: Vec<u8>,
    read_buffer: Vec<u8>,
    mode: ReceiveMode,
    state: ConnectionState,
    link: Option<T::Link>,
    port: Option<String>,
    stats: SessionStats,
    events: Sender<SessionEvent>,
}

impl<T: Transport> Session<T> {
    /// Create a session with an explicit decoder registry.
    pub fn new(
        transport: T,
        registry: DecoderRegistry,
        config: SessionConfig,
    ) -> (Self, Receiver<SessionEvent>) {
        let (events, receiver) = mpsc::channel();
        let session = Self {
            transport: Arc::new(transport),
            registry,
            config,
            reassembler: Reassembler::new(config.reassembler),
            reassembly: ReassemblyState::new(),
            line_buffer: Vec::new(),
            read_buffer: vec![0; config.read_chunk_size.max(1)],
            mode: ReceiveMode::Binary,
            state: ConnectionState::Disconnected,
            link: None,
            port: None,
            stats: SessionStats::default(),
            events,
        };
        (session, receiver)
    }

    /// Create a session using the default decoders built from
    /// `config.decoder`.
    pub fn with_config(transport: T, config: SessionConfig) -> (Self, Receiver<SessionEvent>) {
        let registry = DecoderRegistry::with_default_decoders(config.decoder);
        Self::new(transport, registry, config)
    }

    /// Open `port`, retrying failed attempts up to `max_retries` times.
    ///
    /// An existing connection is closed first. Each attempt is bounded by
    /// `open_timeout`; a port missing from enumeration fails immediately.
    pub fn connect(&mut self, port: &str, config: LinkConfig, max_retries: u32) -> Result<()> {
        config
            .validate()
            .map_err(|err| SessionError::InvalidConfig(err.to_string()))?;

        if self.link.is_some() {
            self.disconnect();
            thread::sleep(self.config.settle_delay);
        }

        let ports = self.transport.available_ports().map_err(|err| {
            let err = SessionError::connection(&err);
            self.report_failure(&err);
            err
        })?;
        if !ports.iter().any(|info| info.name == port) {
            let err = SessionError::Connection {
                kind: ConnectionErrorKind::PortNotFound,
                message: format!("{port} is not among the available ports"),
            };
            self.report_failure(&err);
            return Err(err);
        }

        let attempts = max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            self.state = ConnectionState::Connecting;
            debug!(port, attempt, attempts, %config, "opening port");
            match self.open_bounded(port, config) {
                Ok(link) => {
                    self.port = Some(link.port_name().to_string());
                    self.link = Some(link);
                    self.reassembly.reset();
                    self.line_buffer.clear();
                    self.state = ConnectionState::Connected;
                    self.stats.connects += 1;
                    info!(
                        port,
                        transport = self.transport.transport_name(),
                        %config,
                        "connected"
                    );
                    self.emit(SessionEvent::Opened {
                        port: port.to_string(),
                        config,
                    });
                    return Ok(());
                }
                Err(err) => {
                    self.state = ConnectionState::Disconnected;
                    if attempt >= attempts {
                        self.report_failure(&err);
                        return Err(err);
                    }
                    warn!(port, attempt, error = %err, "open failed, retrying");
                    attempt += 1;
                    thread::sleep(self.config.retry_delay);
                }
            }
        }
    }

    /// Run one open on a helper thread and wait at most `open_timeout`.
    fn open_bounded(&self, port: &str, config: LinkConfig) -> Result<T::Link> {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(&self.transport);
        let port_name = port.to_string();
        thread::Builder::new()
            .name("countwire-open".to_string())
            .spawn(move || {
                let result = transport.open(&port_name, &config);
                // The receiver is gone after a timeout; the late link drops here.
                if tx.send(result).is_err() {
                    debug!(port = %port_name, "discarding open that completed after timeout");
                }
            })
            .map_err(|err| SessionError::Connection {
                kind: ConnectionErrorKind::Unknown(err.to_string()),
                message: format!("failed to start open for {port}: {err}"),
            })?;

        match rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(err)) => Err(SessionError::connection(&err)),
            Err(RecvTimeoutError::Timeout) => Err(SessionError::Timeout(self.config.open_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::Connection {
                kind: ConnectionErrorKind::Unknown("open thread exited".to_string()),
                message: format!("open of {port} ended without a result"),
            }),
        }
    }

    /// Close the connection. Does nothing when already closed.
    pub fn disconnect(&mut self) {
        if self.link.is_none() && self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnecting;
        self.close_link();
        info!("disconnected");
    }

    /// Write `bytes` to the device.
    ///
    /// A failed write closes the connection; it is not retried.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let Some(link) = self.link.as_mut() else {
            return Err(SessionError::NotConnected);
        };

        match link.write_all(bytes).and_then(|()| link.flush()) {
            Ok(()) => {
                self.stats.bytes_out += bytes.len() as u64;
                trace!(len = bytes.len(), "wrote");
                Ok(())
            }
            Err(err) => {
                let source = TransportError::Io(err);
                let kind = classify(&source);
                error!(kind = %kind, error = %source, "write failed");
                self.emit(SessionEvent::Error {
                    kind: kind.clone(),
                    message: source.to_string(),
                });
                self.close_link();
                Err(SessionError::Write { kind, source })
            }
        }
    }

    /// Switch between frame decoding and line mode. Buffered partial data
    /// from the previous mode is discarded.
    pub fn set_mode(&mut self, mode: ReceiveMode) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        self.reassembly.reset();
        self.line_buffer.clear();
        if let Some(link) = self.link.as_mut() {
            if let Err(err) = link.discard_input() {
                debug!(error = %err, "could not discard pending input");
            }
        }
        debug!(?mode, "receive mode changed");
        self.mode = mode;
        Ok(())
    }

    /// Read one chunk from the link, process it and run the staleness
    /// timer. Returns the number of bytes read; zero when the read timed out.
    pub fn poll(&mut self) -> Result<usize> {
        let Some(link) = self.link.as_mut() else {
            return Err(SessionError::NotConnected);
        };

        let mut buffer = std::mem::take(&mut self.read_buffer);
        let outcome = loop {
            match link.read(&mut buffer) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => break Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break Ok(0)
                }
                Err(err) => break Err(TransportError::Io(err)),
            }
        };

        let result = match outcome {
            Ok(n) => {
                if n > 0 {
                    self.handle_bytes(&buffer[..n]);
                }
                self.tick(Instant::now());
                Ok(n)
            }
            Err(err) => Err(self.handle_transport_error(err)),
        };
        self.read_buffer = buffer;
        result
    }

    /// Process bytes received from the link. Ignored unless connected.
    pub fn handle_bytes(&mut self, chunk: &[u8]) {
        if self.state != ConnectionState::Connected {
            trace!(len = chunk.len(), "ignoring bytes outside a connection");
            return;
        }
        self.stats.bytes_in += chunk.len() as u64;
        match self.mode {
            ReceiveMode::Binary => self.handle_binary(chunk),
            ReceiveMode::Lines => self.handle_lines(chunk),
        }
    }

    fn handle_binary(&mut self, chunk: &[u8]) {
        let now = Instant::now();
        self.tick(now);
        let frames = self
            .reassembler
            .accept_at(&mut self.reassembly, chunk, now);
        for frame in frames {
            self.stats.frames += 1;
            match self.registry.dispatch_detailed(&frame) {
                Ok(record) => {
                    self.stats.records += 1;
                    debug!(protocol = %record.protocol, kind = record.kind.name(), "record");
                    self.emit(SessionEvent::Record(record));
                }
                Err(reason) => {
                    self.stats.dropped += 1;
                    warn!(raw = %frame.raw_hex(), "frame dropped: {reason}");
                    self.emit(SessionEvent::Dropped {
                        reason,
                        raw_hex: frame.raw_hex(),
                    });
                }
            }
        }
    }

    fn handle_lines(&mut self, chunk: &[u8]) {
        self.line_buffer.extend_from_slice(chunk);
        while let Some(end) = self.line_buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.line_buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.emit(SessionEvent::Line(
                String::from_utf8_lossy(&line).into_owned(),
            ));
        }

        let limit = self.config.reassembler.max_frame_len;
        if self.line_buffer.len() > limit {
            let discarded = self.line_buffer.len();
            warn!(discarded, limit, "line exceeded buffer limit");
            self.line_buffer.clear();
            self.emit(SessionEvent::Diagnostic(Diagnostic::LineOverflow { discarded }));
        }
    }

    /// Run the staleness timer. Returns the number of purged bytes.
    pub fn tick(&mut self, now: Instant) -> Option<usize> {
        let discarded = self.reassembler.purge_stale(&mut self.reassembly, now)?;
        self.emit(SessionEvent::Diagnostic(Diagnostic::StaleBufferPurged {
            discarded,
        }));
        Some(discarded)
    }

    /// Record a steady-state transport failure and close the connection.
    /// The failure is reported, never retried.
    pub fn handle_transport_error(&mut self, err: TransportError) -> SessionError {
        let kind = classify(&err);
        error!(port = self.port.as_deref().unwrap_or("-"), kind = %kind, error = %err, "connection lost");
        let failure = SessionError::Connection {
            kind,
            message: err.to_string(),
        };
        self.report_failure(&failure);
        self.close_link();
        failure
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Name of the connected port.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn mode(&self) -> ReceiveMode {
        self.mode
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn reassembly_stats(&self) -> ReassemblyStats {
        self.reassembly.stats()
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn close_link(&mut self) {
        self.reassembly.reset();
        self.line_buffer.clear();
        self.link = None;
        self.state = ConnectionState::Disconnected;
        if let Some(port) = self.port.take() {
            self.emit(SessionEvent::Closed { port });
        }
    }

    fn report_failure(&self, err: &SessionError) {
        let kind = match err {
            // The port exists but did not answer in time.
            SessionError::Timeout(_) => ConnectionErrorKind::DeviceNotReady,
            other => other
                .kind()
                .cloned()
                .unwrap_or_else(|| ConnectionErrorKind::Unknown(other.to_string())),
        };
        self.emit(SessionEvent::Error {
            kind,
            message: err.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.link.is_some() {
            self.close_link();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::time::Duration;

    use countwire_frame::FrameFormat;
    use countwire_protocol::{encode, CountResult, CountStatus, DispatchError, ErrorStatus, RecordKind};
    use countwire_transport::{MemoryHandle, MemoryTransport, OpenBehavior};

    use super::*;

    const PORT: &str = "/dev/ttyUSB0";

    fn fast_config() -> SessionConfig {
        SessionConfig {
            open_timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
            ..SessionConfig::default()
        }
    }

    fn session() -> (Session<MemoryTransport>, Receiver<SessionEvent>, MemoryHandle) {
        let transport = MemoryTransport::new([PORT]);
        let handle = transport.handle();
        let (session, events) = Session::with_config(transport, fast_config());
        (session, events, handle)
    }

    fn connected() -> (Session<MemoryTransport>, Receiver<SessionEvent>, MemoryHandle) {
        let (mut session, events, handle) = session();
        session
            .connect(PORT, LinkConfig::default(), 0)
            .expect("memory port should open");
        assert!(matches!(events.try_recv(), Ok(SessionEvent::Opened { .. })));
        (session, events, handle)
    }

    fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
        events.try_iter().collect()
    }

    fn completed_count() -> Vec<u8> {
        encode::counting_machine(&CountResult {
            total_count: 10,
            status: CountStatus::Completed,
            ..CountResult::default()
        })
        .unwrap()
        .to_vec()
    }

    #[test]
    fn connect_emits_opened_and_sets_state() {
        let (session, _events, handle) = connected();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.port(), Some(PORT));
        assert_eq!(session.stats().connects, 1);
        assert_eq!(handle.open_links(), 1);
        assert_eq!(session.registry().decoders().len(), 3);
    }

    #[test]
    fn missing_port_fails_without_opening() {
        let (mut session, events, handle) = session();
        let err = session
            .connect("/dev/ttyS9", LinkConfig::default(), 3)
            .unwrap_err();
        assert_eq!(err.kind(), Some(&ConnectionErrorKind::PortNotFound));
        assert_eq!(handle.open_attempts(), 0);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(matches!(
            drain(&events).as_slice(),
            [SessionEvent::Error {
                kind: ConnectionErrorKind::PortNotFound,
                ..
            }]
        ));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let (mut session, _events, handle) = session();
        let config = LinkConfig {
            baud_rate: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(
            session.connect(PORT, config, 0),
            Err(SessionError::InvalidConfig(_))
        ));
        assert_eq!(handle.open_attempts(), 0);
    }

    #[test]
    fn retries_until_open_succeeds() {
        let transport = MemoryTransport::new([PORT]);
        transport.script_opens([
            OpenBehavior::Fail(ErrorKind::ResourceBusy, "busy".to_string()),
            OpenBehavior::Fail(ErrorKind::PermissionDenied, "denied".to_string()),
        ]);
        let handle = transport.handle();
        let (mut session, _events) = Session::with_config(transport, fast_config());

        session.connect(PORT, LinkConfig::default(), 2).unwrap();
        assert_eq!(handle.open_attempts(), 3);
        assert!(session.is_connected());
    }

    #[test]
    fn exhausted_retries_report_last_classified_error() {
        let transport = MemoryTransport::new([PORT]);
        transport.script_opens([
            OpenBehavior::Fail(ErrorKind::ResourceBusy, "busy".to_string()),
            OpenBehavior::Fail(ErrorKind::PermissionDenied, "denied".to_string()),
        ]);
        let handle = transport.handle();
        let (mut session, _events) = Session::with_config(transport, fast_config());

        let err = session.connect(PORT, LinkConfig::default(), 1).unwrap_err();
        assert_eq!(err.kind(), Some(&ConnectionErrorKind::AccessDenied));
        assert_eq!(handle.open_attempts(), 2);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn slow_open_times_out_and_late_link_is_dropped() {
        let transport = MemoryTransport::new([PORT]);
        transport.script_opens([OpenBehavior::Delay(Duration::from_millis(400))]);
        let handle = transport.handle();
        let config = SessionConfig {
            open_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let (mut session, events) = Session::with_config(transport, config);

        let err = session.connect(PORT, LinkConfig::default(), 0).unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(
            drain(&events),
            vec![SessionEvent::Error {
                kind: ConnectionErrorKind::DeviceNotReady,
                message: "open timed out after 50ms".to_string(),
            }]
        );

        thread::sleep(Duration::from_millis(600));
        assert_eq!(handle.open_links(), 0);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn reconnect_closes_previous_link() {
        let (mut session, events, handle) = connected();
        session.connect(PORT, LinkConfig::default(), 0).unwrap();
        assert_eq!(handle.open_links(), 1);
        let seen = drain(&events);
        assert!(matches!(seen.first(), Some(SessionEvent::Closed { .. })));
        assert!(matches!(seen.last(), Some(SessionEvent::Opened { .. })));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (mut session, events, handle) = connected();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(handle.open_links(), 0);
        assert_eq!(drain(&events).len(), 1);
    }

    #[test]
    fn fragmented_frame_becomes_one_record() {
        let (mut session, events, handle) = connected();
        let wire = completed_count();
        for piece in wire.chunks(5) {
            handle.push(piece.to_vec());
        }
        while session.poll().unwrap() > 0 {}

        let seen = drain(&events);
        assert_eq!(seen.len(), 1);
        let SessionEvent::Record(record) = &seen[0] else {
            panic!("expected record, got {seen:?}");
        };
        assert_eq!(record.protocol, FrameFormat::CountingMachine);
        assert!(matches!(
            &record.kind,
            RecordKind::CountResult(result) if result.status == CountStatus::Completed
        ));
        assert_eq!(session.stats().bytes_in, 44);
        assert_eq!(session.stats().records, 1);
    }

    #[test]
    fn coalesced_frames_keep_order() {
        let (mut session, events, _handle) = connected();
        let mut wire = encode::zm(&RecordKind::ErrorStatus(ErrorStatus { mask: 1 }))
            .unwrap()
            .to_vec();
        wire.extend(completed_count());
        session.handle_bytes(&wire);

        let protocols: Vec<_> = drain(&events)
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Record(record) => Some(record.protocol),
                _ => None,
            })
            .collect();
        assert_eq!(protocols, vec![FrameFormat::Zm, FrameFormat::CountingMachine]);
    }

    #[test]
    fn undecodable_frame_is_dropped_not_fatal() {
        let (mut session, events, _handle) = connected();
        let wire = encode::cdm(&RecordKind::Handshake { command: 0x66 }).unwrap();
        session.handle_bytes(&wire);
        assert!(matches!(
            drain(&events).as_slice(),
            [SessionEvent::Dropped {
                reason: DispatchError::Decode(_),
                ..
            }]
        ));
        assert!(session.is_connected());
        assert_eq!(session.stats().dropped, 1);
    }

    #[test]
    fn stale_partial_frame_is_purged_by_tick() {
        let (mut session, events, _handle) = connected();
        let wire = completed_count();
        session.handle_bytes(&wire[..20]);
        assert_eq!(session.tick(Instant::now()), None);

        let later = Instant::now() + Duration::from_millis(1500);
        assert_eq!(session.tick(later), Some(20));
        assert_eq!(session.reassembly_stats().stale_purges, 1);
        assert_eq!(
            drain(&events),
            vec![SessionEvent::Diagnostic(Diagnostic::StaleBufferPurged {
                discarded: 20
            })]
        );
    }

    #[test]
    fn line_mode_splits_and_strips_carriage_returns() {
        let (mut session, events, _handle) = connected();
        session.set_mode(ReceiveMode::Lines).unwrap();
        session.handle_bytes(b"COUNT 10\r\nTOT");
        session.handle_bytes(b"AL 500\n");
        assert_eq!(
            drain(&events),
            vec![
                SessionEvent::Line("COUNT 10".to_string()),
                SessionEvent::Line("TOTAL 500".to_string()),
            ]
        );
    }

    #[test]
    fn mode_switch_discards_partial_data() {
        let (mut session, events, _handle) = connected();
        let wire = completed_count();
        session.handle_bytes(&wire[..30]);
        session.set_mode(ReceiveMode::Lines).unwrap();
        session.set_mode(ReceiveMode::Binary).unwrap();
        session.handle_bytes(&wire[30..]);
        assert!(drain(&events).is_empty());
        assert_eq!(session.mode(), ReceiveMode::Binary);
    }

    #[test]
    fn writes_reach_the_device() {
        let (mut session, _events, handle) = connected();
        session.write(&[0x01, 0x02]).unwrap();
        assert_eq!(handle.take_written(), vec![0x01, 0x02]);
        assert_eq!(session.stats().bytes_out, 2);
    }

    #[test]
    fn failed_write_closes_session() {
        let (mut session, events, handle) = connected();
        handle.fail_writes(true);
        let err = session.write(&[0xFF]).unwrap_err();
        assert!(matches!(err, SessionError::Write { .. }));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let seen = drain(&events);
        assert!(matches!(seen[0], SessionEvent::Error { .. }));
        assert!(matches!(seen[1], SessionEvent::Closed { .. }));
        assert!(matches!(
            session.write(&[0xFF]),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn unplugged_device_is_classified_and_not_retried() {
        let (mut session, events, handle) = connected();
        handle.unplug();
        let err = session.poll().unwrap_err();
        assert_eq!(err.kind(), Some(&ConnectionErrorKind::DeviceNotReady));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(handle.open_attempts(), 1);
        assert!(drain(&events)
            .iter()
            .any(|event| matches!(event, SessionEvent::Closed { .. })));
    }

    #[test]
    fn operations_need_a_connection() {
        let (mut session, events, _handle) = session();
        assert!(matches!(session.poll(), Err(SessionError::NotConnected)));
        assert!(matches!(
            session.set_mode(ReceiveMode::Lines),
            Err(SessionError::NotConnected)
        ));
        session.handle_bytes(&completed_count());
        assert!(drain(&events).is_empty());
    }
}
