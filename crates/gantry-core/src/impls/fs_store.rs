//! Filesystem store implementation: one file per key, atomic commits.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ulid::Ulid;

use crate::ports::{Store, StoreError, StoreKey, StoreRef};

/// Durable store rooted at a directory.
///
/// Layout: `<root>/<task>/<fingerprint>`. Task names become directory names,
/// so keep them path-friendly. A commit writes to a hidden temp file in the
/// same directory and hard-links it into place; readers never observe a
/// partial value, and a key that is already committed cannot be replaced.
/// Entries survive process restarts, which is the whole point.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.root.join(key.task()).join(key.fingerprint().as_str())
    }
}

#[async_trait]
impl Store for FsStore {
    async fn put(&self, key: &StoreKey, bytes: &[u8]) -> Result<StoreRef, StoreError> {
        let path = self.path_for(key);
        let dir = path.parent().expect("key path always has a parent");
        tokio::fs::create_dir_all(dir).await?;

        // Stage the full value, then hard-link it into place. Unlike rename,
        // link fails when the destination exists, so concurrent writers (even
        // in separate processes) cannot replace a committed entry.
        let tmp = dir.join(format!(".tmp-{}-{}", key.fingerprint(), Ulid::new()));
        tokio::fs::write(&tmp, bytes).await?;
        let committed = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;

        match committed {
            Ok(()) => Ok(StoreRef::new(path.to_string_lossy().into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::KeyExists(key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, reference: &StoreRef) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(reference.as_str()).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::MissingRef(reference.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, key: &StoreKey) -> Result<Option<StoreRef>, StoreError> {
        let path = self.path_for(key);
        Ok(tokio::fs::try_exists(&path)
            .await?
            .then(|| StoreRef::new(path.to_string_lossy().into_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Fingerprint;

    fn key(task: &str, input: i64) -> StoreKey {
        StoreKey::new(task, Fingerprint::of(&input).unwrap())
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let k = key("double", 3);

        let r = store.put(&k, b"six").await.unwrap();
        assert_eq!(store.get(&r).await.unwrap(), b"six");
    }

    #[tokio::test]
    async fn entries_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("double", 3);

        {
            let store = FsStore::new(dir.path());
            store.put(&k, b"six").await.unwrap();
        }

        // "Restarted" process: a fresh instance over the same root.
        let store = FsStore::new(dir.path());
        let r = store.contains(&k).await.unwrap().expect("entry persisted");
        assert_eq!(store.get(&r).await.unwrap(), b"six");
    }

    #[tokio::test]
    async fn second_put_for_same_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let k = key("double", 3);

        store.put(&k, b"six").await.unwrap();
        let err = store.put(&k, b"SIX").await.unwrap_err();
        assert!(matches!(err, StoreError::KeyExists(_)));

        let r = store.contains(&k).await.unwrap().unwrap();
        assert_eq!(store.get(&r).await.unwrap(), b"six");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_puts_commit_exactly_one_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsStore::new(dir.path()));
        let k = key("double", 3);

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = std::sync::Arc::clone(&store);
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                store.put(&k, format!("value-{i}").as_bytes()).await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(e) => assert!(matches!(e, StoreError::KeyExists(_))),
            }
        }
        assert_eq!(committed, 1);

        // The committed value is one writer's full payload, untouched by the
        // losers.
        let r = store.contains(&k).await.unwrap().unwrap();
        let bytes = store.get(&r).await.unwrap();
        assert!(bytes.starts_with(b"value-"));
        assert_eq!(bytes.len(), b"value-0".len());
    }

    #[tokio::test]
    async fn no_temp_files_remain_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put(&key("double", 3), b"six").await.unwrap();

        let task_dir = dir.path().join("double");
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&task_dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with(".tmp-"));
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.contains(&key("double", 3)).await.unwrap().is_none());
    }
}
