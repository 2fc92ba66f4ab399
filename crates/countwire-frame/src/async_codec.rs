use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::Frame;
use crate::error::FrameError;
use crate::reassembler::{Reassembler, ReassemblerConfig, ReassemblyState};

/// `tokio_util` decoder yielding reassembled frames.
///
/// Use with `FramedRead` over any `AsyncRead` carrying the device stream.
#[derive(Debug, Default)]
pub struct CountwireCodec {
    reassembler: Reassembler,
    state: ReassemblyState,
    pending: VecDeque<Frame>,
}

impl CountwireCodec {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            reassembler: Reassembler::new(config),
            state: ReassemblyState::new(),
            pending: VecDeque::new(),
        }
    }

    /// Reassembly state, for diagnostics.
    pub fn state(&self) -> &ReassemblyState {
        &self.state
    }
}

impl Decoder for CountwireCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let chunk = src.split();
            let frames = self.reassembler.accept(&mut self.state, &chunk);
            self.pending.extend(frames);
        }
        Ok(self.pending.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A trailing partial frame is dropped silently at EOF.
        let frame = self.decode(src)?;
        if frame.is_none() {
            self.state.reset();
        }
        Ok(frame)
    }
}
