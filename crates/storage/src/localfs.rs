//! Local filesystem backend.
//! Content-addressed layout: `objects/<first2>/<hex>` under the base
//! directory, written atomically (temp file + rename) and fsynced.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use das_common::{hash, Hash};

use crate::error::StorageError;
use crate::traits::{DasReader, ExpirationPolicy, StorageService};

/// Local filesystem backend. Keeps everything it stores (`KeepForever`);
/// the declared timeout is accepted and ignored.
#[derive(Debug, Clone)]
pub struct LocalFsStorage {
    #[allow(dead_code)]
    base: PathBuf,
    objects_dir: PathBuf,
}

impl LocalFsStorage {
    /// Create a new localfs backend rooted at `base_dir`.
    /// Creates `base_dir/objects` if missing.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base = base_dir.as_ref().to_path_buf();
        let objects_dir = base.join("objects");
        tokio::fs::create_dir_all(&objects_dir).await?;
        Ok(LocalFsStorage { base, objects_dir })
    }

    /// Compute object path for a hash: objects/<first2>/<hex>
    fn object_path(&self, hash: &Hash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir.join(&hex[0..2]).join(hex)
    }

    /// Atomic write: write to a temp file, fsync, then rename.
    async fn atomic_write(&self, dest: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let tmp = dest.with_extension(format!("tmp.{}", ts));
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl DasReader for LocalFsStorage {
    async fn get_by_hash(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(hash);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(*hash))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn expiration_policy(&self) -> Result<ExpirationPolicy, StorageError> {
        Ok(ExpirationPolicy::KeepForever)
    }
}

#[async_trait]
impl StorageService for LocalFsStorage {
    async fn put(&self, value: &[u8], _timeout: u64) -> Result<(), StorageError> {
        let path = self.object_path(&hash::tree_hash(value));
        // Existing object is authoritative (idempotent put).
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        self.atomic_write(&path, value).await
    }

    async fn sync(&self) -> Result<(), StorageError> {
        // Every put fsyncs before renaming; nothing is buffered here.
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let meta = tokio::fs::metadata(&self.objects_dir)
            .await
            .map_err(|err| StorageError::Unhealthy(format!("objects dir: {err}")))?;
        if !meta.is_dir() {
            return Err(StorageError::Unhealthy(format!(
                "objects path {} is not a directory",
                self.objects_dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_common::tree_hash;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_localfs_put_get() {
        let tmp = TempDir::new().expect("tmpdir");
        let store = LocalFsStorage::new(tmp.path()).await.expect("new store");

        let data = b"this is a test payload";
        let key = tree_hash(data);

        assert!(matches!(
            store.get_by_hash(&key).await,
            Err(StorageError::NotFound(_))
        ));
        store.put(data, 0).await.expect("put");
        let got = store.get_by_hash(&key).await.expect("get");
        assert_eq!(got.as_slice(), data);
    }

    #[tokio::test]
    async fn test_localfs_put_idempotent() {
        let tmp = TempDir::new().expect("tmpdir");
        let store = LocalFsStorage::new(tmp.path()).await.expect("new store");

        let data = b"stored once";
        store.put(data, 0).await.expect("put1");
        store.put(data, 0).await.expect("put2");
        let got = store.get_by_hash(&tree_hash(data)).await.expect("get");
        assert_eq!(got.as_slice(), data);
    }

    #[tokio::test]
    async fn test_localfs_object_layout() {
        let tmp = TempDir::new().expect("tmpdir");
        let store = LocalFsStorage::new(tmp.path()).await.expect("new store");

        let data = b"layout probe";
        store.put(data, 0).await.expect("put");

        let hex = tree_hash(data).to_hex();
        let expected = tmp.path().join("objects").join(&hex[0..2]).join(&hex);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_localfs_policy_and_health() {
        let tmp = TempDir::new().expect("tmpdir");
        let store = LocalFsStorage::new(tmp.path()).await.expect("new store");
        assert_eq!(
            store.expiration_policy().await.expect("policy"),
            ExpirationPolicy::KeepForever
        );
        store.health_check().await.expect("healthy");

        tokio::fs::remove_dir_all(tmp.path().join("objects"))
            .await
            .expect("remove");
        assert!(matches!(
            store.health_check().await,
            Err(StorageError::Unhealthy(_))
        ));
    }
}
