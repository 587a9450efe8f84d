//! In-memory store implementation for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{Store, StoreError, StoreKey, StoreRef};

/// Write-once map in process memory.
///
/// Not durable across restarts, obviously; it exists so the engine can be
/// exercised without touching the filesystem. References are the key strings
/// themselves.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entries (handy in tests).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &StoreKey, bytes: &[u8]) -> Result<StoreRef, StoreError> {
        let mut entries = self.entries.lock().await;
        let raw = key.to_string();
        if entries.contains_key(&raw) {
            return Err(StoreError::KeyExists(key.clone()));
        }
        entries.insert(raw.clone(), bytes.to_vec());
        Ok(StoreRef::new(raw))
    }

    async fn get(&self, reference: &StoreRef) -> Result<Vec<u8>, StoreError> {
        let entries = self.entries.lock().await;
        entries
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| StoreError::MissingRef(reference.clone()))
    }

    async fn contains(&self, key: &StoreKey) -> Result<Option<StoreRef>, StoreError> {
        let entries = self.entries.lock().await;
        let raw = key.to_string();
        Ok(entries.contains_key(&raw).then(|| StoreRef::new(raw)))
    }
}
