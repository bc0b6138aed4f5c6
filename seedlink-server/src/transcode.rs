//! Pluggable payload transcoders.
//!
//! A transcoder sees one ingested payload at a time and may return any
//! number of derived payloads (a format conversion, a classification
//! record, ...). The gateway publishes them after the original record.

use std::sync::Arc;

use seedlink4_protocol::{PayloadFormat, PayloadSubformat};

/// One payload produced by a [`Transcoder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcoded {
    pub format: PayloadFormat,
    pub subformat: Option<PayloadSubformat>,
    pub payload: Vec<u8>,
}

pub trait Transcoder: Send + Sync {
    /// Derive zero or more payloads from one ingested payload of `format`.
    fn transcode(&self, format: PayloadFormat, payload: &[u8]) -> Vec<Transcoded>;
}

impl<F> Transcoder for F
where
    F: Fn(PayloadFormat, &[u8]) -> Vec<Transcoded> + Send + Sync,
{
    fn transcode(&self, format: PayloadFormat, payload: &[u8]) -> Vec<Transcoded> {
        self(format, payload)
    }
}

/// Transcoders in registration order. Clone is cheap.
#[derive(Clone, Default)]
pub(crate) struct TranscoderChain(Vec<Arc<dyn Transcoder>>);

impl TranscoderChain {
    pub fn push(&mut self, transcoder: Arc<dyn Transcoder>) {
        self.0.push(transcoder);
    }

    pub fn apply(&self, format: PayloadFormat, payload: &[u8]) -> Vec<Transcoded> {
        self.0
            .iter()
            .flat_map(|t| t.transcode(format, payload))
            .collect()
    }
}

impl std::fmt::Debug for TranscoderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscoderChain")
            .field("len", &self.0.len())
            .finish()
    }
}
