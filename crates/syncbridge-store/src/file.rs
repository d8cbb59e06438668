//! File-backed blob store: one file per key inside a directory.
//!
//! Each save rewrites the whole file through a temporary file and a rename,
//! so a crash leaves either the old or the new blob. Filesystem calls run on
//! the blocking pool via `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::BlobStore;

/// Extension of blob files.
const EXTENSION: &str = "sbq";

/// Directory-backed blob store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store blobs under `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path holding the blob for `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", key, EXTENSION)))
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Io(std::io::Error::other(format!("blocking task failed: {}", e)))
}

#[async_trait]
impl BlobStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key)?;
        tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        })
        .await
        .map_err(join_error)?
    }

    async fn save(&self, key: &str, value: Bytes, _ttl: Option<Duration>) -> Result<()> {
        let path = self.path_for(key)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
            {
                use std::io::Write;
                let mut file = std::fs::File::create(&tmp)?;
                file.write_all(&value)?;
                file.sync_all()?;
            }
            std::fs::rename(&tmp, &path)?;
            tracing::trace!(path = %path.display(), bytes = value.len(), "blob saved");
            Ok::<(), StoreError>(())
        })
        .await
        .map_err(join_error)?
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_key_loads_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.load("queue").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_rewrites_whole_blob() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        store.save("queue", Bytes::from_static(b"first version"), None).await.unwrap();
        store.save("queue", Bytes::from_static(b"second"), None).await.unwrap();

        assert_eq!(store.load("queue").await.unwrap(), Some(Bytes::from_static(b"second")));
        assert!(store.path_for("queue").unwrap().exists());
        assert!(!dir.path().join("nested").join("queue.sbq.tmp").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.save("../escape", Bytes::new(), None).await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(store.path_for("").is_err());
    }
}
