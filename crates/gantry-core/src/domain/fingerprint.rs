//! Input fingerprints: the cache and store key for memoization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic digest of a task input.
///
/// Computed as the blake3 hash of the canonical JSON encoding of the value.
/// serde_json's default map representation keeps keys sorted, so two inputs
/// that are logically equal produce the same fingerprint regardless of how
/// their maps were built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint any serializable value.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self(blake3::hash(&bytes).to_hex().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
