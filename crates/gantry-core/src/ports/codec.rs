//! Codec port: format-agnostic (de)serialization of persisted entries.

use thiserror::Error;

use crate::domain::StoredEntry;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Turns a [`StoredEntry`] into bytes for the store, and back.
///
/// The engine is format-agnostic: inject a different codec to persist as
/// anything that can carry the entry losslessly.
pub trait Codec: Send + Sync {
    fn encode(&self, entry: &StoredEntry) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<StoredEntry, CodecError>;
}
