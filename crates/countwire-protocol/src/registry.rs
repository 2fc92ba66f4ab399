use countwire_frame::Frame;
use tracing::{debug, warn};

use crate::cdm::CdmDecoder;
use crate::config::DecoderConfig;
use crate::counting::CountingMachineDecoder;
use crate::decoder::Decoder;
use crate::error::DispatchError;
use crate::record::Record;
use crate::zm::ZmDecoder;

/// Ordered set of decoders consulted for every frame.
///
/// Decoders are tried in registration order and the first successful
/// decode wins. The set is append-only.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Registry holding the counting-machine, CDM and ZM decoders, in that
    /// order.
    pub fn with_default_decoders(config: DecoderConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CountingMachineDecoder::new(config)));
        registry.register(Box::new(CdmDecoder::new(config)));
        registry.register(Box::new(ZmDecoder::new(config)));
        registry
    }

    /// Append a decoder.
    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        debug!(decoder = decoder.name(), "decoder registered");
        self.decoders.push(decoder);
    }

    /// Decode `frame`, logging why when no record results.
    pub fn dispatch(&self, frame: &Frame) -> Option<Record> {
        match self.dispatch_detailed(frame) {
            Ok(record) => Some(record),
            Err(err @ DispatchError::Unmatched { .. }) => {
                debug!(raw = %frame.raw_hex(), "{err}");
                None
            }
            Err(DispatchError::Decode(err)) => {
                warn!(raw = %frame.raw_hex(), "frame dropped: {err}");
                None
            }
        }
    }

    /// Decode `frame`, reporting the last decoder failure or that no
    /// decoder matched.
    pub fn dispatch_detailed(&self, frame: &Frame) -> Result<Record, DispatchError> {
        let mut last_error = None;
        for decoder in self.decoders.iter().filter(|d| d.can_handle(frame)) {
            match decoder.decode(frame) {
                Ok(record) => return Ok(record),
                Err(err) => {
                    debug!(decoder = decoder.name(), error = %err, "decoder rejected frame");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(DispatchError::Decode(err)),
            None => Err(DispatchError::Unmatched {
                header: frame.header(),
                command: frame.command(),
            }),
        }
    }

    /// Names of registered decoders, in dispatch order.
    pub fn decoders(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_default_decoders(DecoderConfig::default())
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("decoders", &self.decoders())
            .finish()
    }
}
