use std::time::Duration;

use countwire_frame::ReassemblerConfig;
use countwire_protocol::DecoderConfig;

/// Default bound on a single open attempt.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Session timing and buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bound on one open attempt. A link that opens later is dropped.
    pub open_timeout: Duration,
    /// Pause between failed open attempts.
    pub retry_delay: Duration,
    /// Pause after closing a previous link before reopening.
    pub settle_delay: Duration,
    /// Largest single read from the link.
    pub read_chunk_size: usize,
    pub reassembler: ReassemblerConfig,
    /// Used by [`Session::with_config`](crate::Session::with_config) to
    /// build the default decoders.
    pub decoder: DecoderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            reassembler: ReassemblerConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}
