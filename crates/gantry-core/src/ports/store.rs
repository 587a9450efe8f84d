//! Store port: durable, write-once key/value persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::Fingerprint;

/// Composite key of a persisted output: stable task name + input fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    task: String,
    fingerprint: Fingerprint,
}

impl StoreKey {
    pub fn new(task: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            task: task.into(),
            fingerprint,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task, self.fingerprint)
    }
}

/// Opaque reference to a committed entry (a path, a map key, a blob id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreRef(String);

impl StoreRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The key was already committed; a write-once store never overwrites.
    #[error("key already written: {0}")]
    KeyExists(StoreKey),

    #[error("no entry for reference {0}")]
    MissingRef(StoreRef),

    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key/value mapping with append-only semantics.
///
/// Contract:
/// - `put` commits atomically: either the full value is durable under the key,
///   or nothing is. Committing an existing key is an error, never a silent
///   overwrite.
/// - `contains` returns the reference for an already-committed key, so a
///   process that did not perform the write can still reach the value.
/// - Concurrent reads are safe; concurrent writes to *different* keys never
///   conflict.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &StoreKey, bytes: &[u8]) -> Result<StoreRef, StoreError>;

    async fn get(&self, reference: &StoreRef) -> Result<Vec<u8>, StoreError>;

    async fn contains(&self, key: &StoreKey) -> Result<Option<StoreRef>, StoreError>;
}
