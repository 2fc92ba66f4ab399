use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::codec::Frame;
use crate::format::{find_header, is_header_lead, FrameFormat, Probe};

/// Quiescence window after which a stalled partial frame is discarded.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_millis(1000);

/// Largest frame the reassembler will wait for.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Configuration for the reassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblerConfig {
    /// Discard buffered bytes after this long without new input.
    pub stale_after: Duration,
    /// Declared lengths above this are treated as false headers.
    pub max_frame_len: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Running counters for one reassembly state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReassemblyStats {
    /// Complete frames emitted.
    pub frames: u64,
    /// Noise bytes dropped while searching for a header.
    pub discarded_bytes: u64,
    /// False headers skipped.
    pub resyncs: u64,
    /// Partial frames purged by the staleness timer.
    pub stale_purges: u64,
}

/// Per-connection reassembly buffer.
///
/// Owned by whoever owns the connection and passed to the [`Reassembler`]
/// on every call, so resets are explicit.
#[derive(Debug)]
pub struct ReassemblyState {
    buffer: BytesMut,
    last_activity: Option<Instant>,
    stats: ReassemblyStats,
}

impl ReassemblyState {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            last_activity: None,
            stats: ReassemblyStats::default(),
        }
    }

    /// Bytes currently held waiting for a frame to complete.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// When bytes were last appended.
    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Drop buffered bytes and the activity timestamp. Counters survive.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_activity = None;
    }
}

impl Default for ReassemblyState {
    fn default() -> Self {
        Self::new()
    }
}

/// Recovers frame boundaries from a raw byte stream.
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    config: ReassemblerConfig,
}

impl Reassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }

    /// Append `bytes` and return every frame that is now complete.
    pub fn accept(&self, state: &mut ReassemblyState, bytes: &[u8]) -> Vec<Frame> {
        self.accept_at(state, bytes, Instant::now())
    }

    /// [`accept`](Self::accept) with an explicit clock.
    pub fn accept_at(&self, state: &mut ReassemblyState, bytes: &[u8], now: Instant) -> Vec<Frame> {
        // A stalled partial frame must not absorb unrelated later bytes.
        self.purge_stale(state, now);

        if !bytes.is_empty() {
            state.buffer.extend_from_slice(bytes);
            state.last_activity = Some(now);
        }

        let mut frames = Vec::new();
        loop {
            let Some(start) = find_header(&state.buffer) else {
                let keep = usize::from(state.buffer.last().is_some_and(|b| is_header_lead(*b)));
                let discard = state.buffer.len() - keep;
                if discard > 0 {
                    debug!(len = discard, "no frame header; discarding bytes");
                    state.stats.discarded_bytes += discard as u64;
                    state.buffer.advance(discard);
                }
                break;
            };

            if start > 0 {
                debug!(len = start, "discarding bytes before frame header");
                state.stats.discarded_bytes += start as u64;
                state.buffer.advance(start);
            }

            match FrameFormat::probe(&state.buffer, self.config.max_frame_len) {
                Probe::Incomplete => {
                    trace!(buffered = state.buffer.len(), "awaiting rest of frame");
                    break;
                }
                Probe::Invalid => {
                    debug!(
                        header = %hex::encode_upper(&state.buffer[..2]),
                        "implausible frame header; resynchronising"
                    );
                    state.stats.resyncs += 1;
                    state.stats.discarded_bytes += 1;
                    state.buffer.advance(1);
                }
                Probe::Complete(format, total) => {
                    let raw = state.buffer.split_to(total).freeze();
                    trace!(%format, len = total, "frame reassembled");
                    state.stats.frames += 1;
                    frames.push(Frame::from_raw(format, raw));
                }
            }
        }

        if state.buffer.is_empty() {
            state.last_activity = None;
        }
        frames
    }

    /// Discard the buffer if it has been waiting longer than the staleness
    /// window. Returns the number of bytes dropped.
    pub fn purge_stale(&self, state: &mut ReassemblyState, now: Instant) -> Option<usize> {
        let last = state.last_activity?;
        if state.buffer.is_empty()
            || now.saturating_duration_since(last) < self.config.stale_after
        {
            return None;
        }

        let dropped = state.buffer.len();
        warn!(
            len = dropped,
            idle_ms = now.saturating_duration_since(last).as_millis() as u64,
            "discarding stale partial frame"
        );
        state.stats.stale_purges += 1;
        state.stats.discarded_bytes += dropped as u64;
        state.reset();
        Some(dropped)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn cdm(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(FrameFormat::Cdm, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn zm(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(FrameFormat::Zm, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn counting_machine(status: u8) -> Vec<u8> {
        let mut payload = vec![0u8; 40];
        payload[0] = 0x0E;
        payload[1] = status;
        let mut buf = BytesMut::new();
        encode_frame(FrameFormat::CountingMachine, &payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn setup() -> (Reassembler, ReassemblyState) {
        (Reassembler::default(), ReassemblyState::new())
    }

    #[test]
    fn single_frame_in_one_chunk() {
        let (r, mut s) = setup();
        let wire = cdm(&[0x04, 0x00, 0x03]);
        let frames = r.accept(&mut s, &wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw(), wire.as_slice());
        assert_eq!(s.buffered(), 0);
        assert!(s.last_activity().is_none());
    }

    #[test]
    fn fragmented_frame_completes_on_last_byte() {
        let (r, mut s) = setup();
        let wire = counting_machine(0x02);
        for (i, byte) in wire.iter().enumerate() {
            let frames = r.accept(&mut s, std::slice::from_ref(byte));
            if i + 1 < wire.len() {
                assert!(frames.is_empty(), "premature frame at byte {i}");
            } else {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].format(), FrameFormat::CountingMachine);
            }
        }
    }

    #[test]
    fn every_split_point_yields_the_same_frame() {
        let r = Reassembler::default();
        let wire = zm(&[0x02, 0x10, 0x20, 0x30, 0x40]);
        for split in 0..=wire.len() {
            let mut s = ReassemblyState::new();
            let mut frames = r.accept(&mut s, &wire[..split]);
            frames.extend(r.accept(&mut s, &wire[split..]));
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].raw(), wire.as_slice());
        }
    }

    #[test]
    fn coalesced_frames_in_order() {
        let (r, mut s) = setup();
        let mut wire = cdm(&[0x01]);
        wire.extend(zm(&[0x01]));
        wire.extend(counting_machine(0x01));
        let frames = r.accept(&mut s, &wire);
        let formats: Vec<_> = frames.iter().map(Frame::format).collect();
        assert_eq!(
            formats,
            vec![FrameFormat::Cdm, FrameFormat::Zm, FrameFormat::CountingMachine]
        );
        assert_eq!(s.stats().frames, 3);
    }

    #[test]
    fn back_to_back_zm_frames_split_by_length() {
        let (r, mut s) = setup();
        let mut wire = zm(&[0x04, 0x00, 0x01]);
        wire.extend(zm(&[0x04, 0x00, 0x02]));
        let frames = r.accept(&mut s, &wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data(), &[0x00, 0x01]);
        assert_eq!(frames[1].data(), &[0x00, 0x02]);
    }

    #[test]
    fn leading_noise_is_discarded() {
        let (r, mut s) = setup();
        let mut wire = vec![0x00, 0x13, 0x37, 0xDF, 0x55, 0xA5];
        let frame = cdm(&[0x01]);
        wire.extend(&frame);
        let frames = r.accept(&mut s, &wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw(), frame.as_slice());
        assert_eq!(s.stats().discarded_bytes, 6);
    }

    #[test]
    fn pure_noise_is_dropped_not_buffered() {
        let (r, mut s) = setup();
        let frames = r.accept(&mut s, &[0x01, 0x02, 0x03, 0x04]);
        assert!(frames.is_empty());
        assert_eq!(s.buffered(), 0);
    }

    #[test]
    fn header_split_across_chunks_is_kept() {
        let (r, mut s) = setup();
        let wire = cdm(&[0x01]);
        assert!(r.accept(&mut s, &[0x42, wire[0]]).is_empty());
        assert_eq!(s.buffered(), 1);
        let frames = r.accept(&mut s, &wire[1..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn header_bytes_inside_pending_payload_are_not_boundaries() {
        let (r, mut s) = setup();
        // Data contains both header signatures.
        let wire = cdm(&[0x02, 0xFD, 0xDF, 0x03, 0x01, 0xAA, 0x55, 0x01, 0x00]);
        let mid = 6;
        assert!(r.accept(&mut s, &wire[..mid]).is_empty());
        let frames = r.accept(&mut s, &wire[mid..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw(), wire.as_slice());
    }

    #[test]
    fn false_header_resynchronises() {
        let (r, mut s) = setup();
        // ZM header with a bad trailer, followed by a good CDM frame.
        let mut wire = vec![0xAA, 0x55, 0x01, 0x00, 0x01, 0x01, 0x00, 0x00];
        let good = cdm(&[0x01]);
        wire.extend(&good);
        let frames = r.accept(&mut s, &wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw(), good.as_slice());
        assert!(s.stats().resyncs >= 1);
    }

    #[test]
    fn stale_partial_frame_is_purged_before_new_bytes() {
        let (r, mut s) = setup();
        let t0 = Instant::now();
        let partial = &cdm(&[0x04, 0x00, 0x01])[..4];
        assert!(r.accept_at(&mut s, partial, t0).is_empty());
        assert_eq!(s.buffered(), 4);

        // Bytes that would complete the stale frame arrive too late.
        let late = t0 + Duration::from_millis(1000);
        let frames = r.accept_at(&mut s, &[0x00, 0x01, 0xC3], late);
        assert!(frames.is_empty());
        assert_eq!(s.stats().stale_purges, 1);
    }

    #[test]
    fn stale_purge_does_not_resurface_with_coincidental_header() {
        let (r, mut s) = setup();
        let t0 = Instant::now();
        // Partial CDM frame declaring 10 bytes after the length byte.
        assert!(r
            .accept_at(&mut s, &[0xFD, 0xDF, 0x0A, 0x02, 0x11], t0)
            .is_empty());

        let good = cdm(&[0x01]);
        let frames = r.accept_at(&mut s, &good, t0 + Duration::from_millis(1500));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw(), good.as_slice());
    }

    #[test]
    fn activity_within_window_keeps_partial_frame() {
        let (r, mut s) = setup();
        let t0 = Instant::now();
        let wire = cdm(&[0x04, 0x00, 0x01]);
        assert!(r.accept_at(&mut s, &wire[..3], t0).is_empty());
        assert!(r
            .accept_at(&mut s, &wire[3..5], t0 + Duration::from_millis(900))
            .is_empty());
        let frames = r.accept_at(&mut s, &wire[5..], t0 + Duration::from_millis(1800));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn purge_stale_on_timer() {
        let (r, mut s) = setup();
        let t0 = Instant::now();
        r.accept_at(&mut s, &[0xAA, 0x55, 0x05], t0);
        assert_eq!(r.purge_stale(&mut s, t0 + Duration::from_millis(999)), None);
        assert_eq!(
            r.purge_stale(&mut s, t0 + Duration::from_millis(1000)),
            Some(3)
        );
        assert_eq!(s.buffered(), 0);
        assert_eq!(r.purge_stale(&mut s, t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn reset_clears_buffer_but_keeps_counters() {
        let (r, mut s) = setup();
        r.accept(&mut s, &cdm(&[0x01]));
        r.accept(&mut s, &[0xFD, 0xDF, 0x09]);
        s.reset();
        assert_eq!(s.buffered(), 0);
        assert_eq!(s.stats().frames, 1);
    }

    #[test]
    fn oversized_declaration_is_skipped() {
        let r = Reassembler::new(ReassemblerConfig {
            max_frame_len: 32,
            ..ReassemblerConfig::default()
        });
        let mut s = ReassemblyState::new();
        let mut wire = vec![0xAA, 0x55, 0x00, 0x10];
        let good = zm(&[0x01]);
        wire.extend(&good);
        let frames = r.accept(&mut s, &wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw(), good.as_slice());
    }
}
