use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::time::Instant;

use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::reassembler::{Reassembler, ReassemblerConfig, ReassemblyState};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete frames from any `Read` stream.
///
/// Partial reads and line noise are absorbed here; callers only ever see
/// complete frames.
pub struct FrameReader<T> {
    inner: T,
    reassembler: Reassembler,
    state: ReassemblyState,
    pending: VecDeque<Frame>,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, ReassemblerConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: ReassemblerConfig) -> Self {
        Self {
            inner,
            reassembler: Reassembler::new(config),
            state: ReassemblyState::new(),
            pending: VecDeque::new(),
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the stream reports a read timeout with no
    /// complete frame available, and `Err(FrameError::ConnectionClosed)` at
    /// EOF.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
                {
                    self.reassembler.purge_stale(&mut self.state, Instant::now());
                    return Ok(None);
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            let frames = self.reassembler.accept(&mut self.state, &chunk[..read]);
            self.pending.extend(frames);
        }
    }

    /// Reassembly state, for diagnostics.
    pub fn state(&self) -> &ReassemblyState {
        &self.state
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;
    use crate::format::FrameFormat;

    fn wire(frames: &[(FrameFormat, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (format, payload) in frames {
            encode_frame(*format, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_multiple_frames() {
        let bytes = wire(&[
            (FrameFormat::Cdm, &[0x01][..]),
            (FrameFormat::Zm, &[0x04, 0x00, 0x02][..]),
            (FrameFormat::Cdm, &[0x04, 0x00, 0x08][..]),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let f1 = reader.read_frame().unwrap().unwrap();
        let f2 = reader.read_frame().unwrap().unwrap();
        let f3 = reader.read_frame().unwrap().unwrap();

        assert_eq!(f1.format(), FrameFormat::Cdm);
        assert_eq!(f2.format(), FrameFormat::Zm);
        assert_eq!(f3.data(), &[0x00, 0x08]);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[(FrameFormat::Zm, &[0x02, 0x01, 0x02, 0x03][..])]);
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });
        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame.command(), 0x02);
    }

    #[test]
    fn noise_before_frame_is_skipped() {
        let mut bytes = vec![0x00, 0xFF, 0x12];
        bytes.extend(wire(&[(FrameFormat::Cdm, &[0x01][..])]));
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame.command(), 0x01);
        assert_eq!(reader.state().stats().discarded_bytes, 3);
    }

    #[test]
    fn connection_closed_mid_frame() {
        let bytes = wire(&[(FrameFormat::Cdm, &[0x04, 0x00, 0x01][..])]);
        let mut reader = FrameReader::new(Cursor::new(bytes[..4].to_vec()));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
        assert_eq!(reader.state().buffered(), 4);
    }

    #[test]
    fn timeout_is_a_poll_not_an_error() {
        let bytes = wire(&[(FrameFormat::Cdm, &[0x01][..])]);
        let mut reader = FrameReader::new(TimeoutThenData {
            timed_out: false,
            bytes,
            pos: 0,
        });
        assert!(reader.read_frame().unwrap().is_none());
        assert!(reader.read_frame().unwrap().is_some());
    }

    #[test]
    fn other_io_errors_propagate() {
        let mut reader = FrameReader::new(FailingReader);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct TimeoutThenData {
        timed_out: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for TimeoutThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(std::io::Error::from(ErrorKind::TimedOut));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }
}
