//! Default JSON codec.

use crate::domain::StoredEntry;
use crate::ports::{Codec, CodecError};

/// Encodes stored entries as JSON via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, entry: &StoredEntry) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(entry).map_err(CodecError::Encode)
    }

    fn decode(&self, bytes: &[u8]) -> Result<StoredEntry, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn roundtrip() {
        let entry = StoredEntry {
            output: serde_json::json!([1, 2, 3]),
            attempts: 1,
            recorded_at: Utc::now(),
        };
        let codec = JsonCodec;
        let back = codec.decode(&codec.encode(&entry).unwrap()).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = JsonCodec.decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
