//! # Disk Store
//!
//! This module implements the file-backed persistent store. Each named store
//! is a directory under the engine's cache root with one subdirectory per
//! partition; entries are keyed by a hash of the resource name so arbitrary
//! names stay filename-safe.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::cache::types::{ResourceMetadata, StoreLookup, StoreResult};

use super::StoreBackend;

const METADATA_DIR: &str = "metadata";
const FILEDATA_DIR: &str = "filedata";

#[derive(Debug, Clone)]
pub struct DiskStore {
    name: String,
    store_dir: PathBuf,
}

impl DiskStore {
    /// Create a handle for the named store under the given cache root.
    ///
    /// Nothing touches the filesystem until `open()`.
    pub fn new(cache_root: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        let store_dir = cache_root.as_ref().join(&name);
        Self { name, store_dir }
    }

    /// Destroy the named store at the storage layer, whether or not a handle
    /// to it is currently open. Absent stores are a no-op.
    pub async fn destroy(cache_root: impl AsRef<Path>, name: &str) -> StoreResult<()> {
        let store_dir = cache_root.as_ref().join(name);
        match fs::remove_dir_all(&store_dir).await {
            Ok(()) => {
                debug!(name = name, "Destroyed store directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(name = name, error = %e, "Failed to destroy store directory");
                Err(e)
            }
        }
    }

    /// Convert a resource name to a filename-safe identifier
    fn filename(key: &str) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(key);
        let hash = hasher.finalize();
        format!("{hash:x}")
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.store_dir.join(FILEDATA_DIR).join(Self::filename(key))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.store_dir.join(METADATA_DIR).join(Self::filename(key))
    }
}

#[async_trait::async_trait]
impl StoreBackend for DiskStore {
    async fn open(&self) -> StoreResult<()> {
        // Store names become directory names; reject anything that would
        // escape the cache root
        if self.name.is_empty()
            || self.name.contains('/')
            || self.name.contains('\\')
            || self.name == ".."
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid store name: {:?}", self.name),
            ));
        }

        fs::create_dir_all(self.store_dir.join(METADATA_DIR)).await?;
        fs::create_dir_all(self.store_dir.join(FILEDATA_DIR)).await?;

        debug!(name = %self.name, dir = ?self.store_dir, "Opened store");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreLookup {
        let data_path = self.data_path(key);
        let meta_path = self.metadata_path(key);

        let metadata_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to read metadata entry");
                return Err(e);
            }
        };

        let metadata: ResourceMetadata = match serde_json::from_slice(&metadata_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to parse metadata entry");

                // Discard the damaged entry in the background and report a miss
                let data_path = data_path.clone();
                let meta_path = meta_path.clone();
                tokio::spawn(async move {
                    let _ = fs::remove_file(&data_path).await;
                    let _ = fs::remove_file(&meta_path).await;
                });

                return Ok(None);
            }
        };

        let data = match fs::read(&data_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = ?data_path, error = %e, "Failed to read data entry");
                return Err(e);
            }
        };

        Ok(Some((Bytes::from(data), metadata)))
    }

    async fn put(&self, key: &str, data: Bytes, metadata: ResourceMetadata) -> StoreResult<()> {
        let data_path = self.data_path(key);
        let meta_path = self.metadata_path(key);

        let metadata_json = serde_json::to_vec(&metadata)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Write to temporary files, then rename, so a reader never observes
        // one partition without the other. The partition directories are
        // created by open() and deliberately NOT recreated here: a write-back
        // racing a store deletion must fail rather than resurrect the store.
        let temp_data_path = data_path.with_extension("tmp");
        let temp_meta_path = meta_path.with_extension("tmp");

        if let Err(e) = fs::write(&temp_data_path, &data).await {
            warn!(path = ?temp_data_path, error = %e, "Failed to write data entry");
            return Err(e);
        }

        if let Err(e) = fs::write(&temp_meta_path, &metadata_json).await {
            warn!(path = ?temp_meta_path, error = %e, "Failed to write metadata entry");
            let _ = fs::remove_file(&temp_data_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_data_path, &data_path).await {
            warn!(from = ?temp_data_path, to = ?data_path, error = %e, "Failed to rename data entry");
            let _ = fs::remove_file(&temp_data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            warn!(from = ?temp_meta_path, to = ?meta_path, error = %e, "Failed to rename metadata entry");
            // The data rename landed but the metadata did not; drop both so
            // the entry stays consistent
            let _ = fs::remove_file(&data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        debug!(name = %self.name, key = key, size = data.len(), "Cached entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let root = tempdir().unwrap();
        let store = DiskStore::new(root.path(), "assets");
        store.open().await.unwrap();

        let payload = Bytes::from_static(b"\x00\x01binary payload\xff");
        let metadata = ResourceMetadata::new(payload.len() as u64)
            .with_content_type("application/octet-stream");
        store.put("x.bin", payload.clone(), metadata).await.unwrap();

        let (data, metadata) = store.get("x.bin").await.unwrap().unwrap();
        assert_eq!(data, payload);
        assert_eq!(metadata.size, payload.len() as u64);
        assert_eq!(
            metadata.content_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[tokio::test]
    async fn test_get_missing_key_is_a_miss() {
        let root = tempdir().unwrap();
        let store = DiskStore::new(root.path(), "assets");
        store.open().await.unwrap();

        assert!(store.get("absent.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_a_miss() {
        let root = tempdir().unwrap();
        let store = DiskStore::new(root.path(), "assets");
        store.open().await.unwrap();

        let payload = Bytes::from_static(b"data");
        store
            .put("x.bin", payload, ResourceMetadata::new(4))
            .await
            .unwrap();

        // Clobber the metadata entry
        tokio::fs::write(store.metadata_path("x.bin"), b"not json")
            .await
            .unwrap();

        assert!(store.get("x.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_after_destroy_fails() {
        let root = tempdir().unwrap();
        let store = DiskStore::new(root.path(), "assets");
        store.open().await.unwrap();

        DiskStore::destroy(root.path(), "assets").await.unwrap();

        let err = store
            .put("x.bin", Bytes::from_static(b"data"), ResourceMetadata::new(4))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_destroy_absent_store_is_noop() {
        let root = tempdir().unwrap();
        DiskStore::destroy(root.path(), "never-opened").await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_path_separators() {
        let root = tempdir().unwrap();
        let store = DiskStore::new(root.path(), "../escape");
        assert!(store.open().await.is_err());

        let store = DiskStore::new(root.path(), "");
        assert!(store.open().await.is_err());
    }
}
