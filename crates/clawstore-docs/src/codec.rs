//! Structured serialization codec
//!
//! Records reach the codec as `serde_json::Value` objects built from their
//! field tables, so any self-describing format can stand in for JSON.

use serde_json::Value;

use crate::error::{DocError, DocResult};

/// Encodes structured values to file bytes and back.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> DocResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> DocResult<Value>;
}

/// JSON codec backed by serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    /// Pretty-print output
    pub indent: bool,
}

impl JsonCodec {
    pub fn new(indent: bool) -> Self {
        Self { indent }
    }
}

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> DocResult<Vec<u8>> {
        let bytes = if self.indent {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> DocResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| DocError::Serialization {
            message: format!("invalid JSON: {}", e),
        })
    }
}
