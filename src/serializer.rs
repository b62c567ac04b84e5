//! Serializer contract and the JSON implementation
//!
//! A serializer encodes the flat wire envelope (declared properties plus
//! the header under the reserved key) to bytes and back. Transports declare
//! which serializer the core should use.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::TransportError;

/// Total, deterministic envelope codec.
pub trait Serializer: Send + Sync {
    /// Name stamped into headers at publish time.
    fn name(&self) -> &'static str;

    /// Encodes the envelope.
    ///
    /// # Errors
    ///
    /// `Serialization` when the envelope cannot be encoded.
    fn encode(&self, envelope: &Map<String, Value>) -> Result<Bytes, TransportError>;

    /// Decodes bytes into an envelope.
    ///
    /// # Errors
    ///
    /// `Deserialization` when the bytes are not a valid encoding or not a
    /// flat mapping.
    fn decode(&self, payload: &[u8]) -> Result<Map<String, Value>, TransportError>;
}

/// JSON wire codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Creates the codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn encode(&self, envelope: &Map<String, Value>) -> Result<Bytes, TransportError> {
        serde_json::to_vec(envelope)
            .map(Bytes::from)
            .map_err(|source| TransportError::Serialization {
                source: Box::new(source),
            })
    }

    fn decode(&self, payload: &[u8]) -> Result<Map<String, Value>, TransportError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|source| TransportError::Deserialization {
                source: Box::new(source),
            })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(TransportError::Deserialization {
                source: format!("expected a JSON object envelope, got {other}").into(),
            }),
        }
    }
}
