//! In-memory storage backend.
//! Fully deterministic, no I/O; the backend of choice for tests and for
//! wrapper layers that need a cheap base service.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use das_common::{hash, Hash};

use crate::error::StorageError;
use crate::traits::{DasReader, ExpirationPolicy, StorageService};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    timeout: u64,
}

/// In-memory content-addressed store keyed by tree hash.
///
/// Entries keep the latest (largest) timeout they were stored with;
/// [`MemoryStorage::prune_expired`] honors the `DiscardAfterDataTimeout`
/// policy when the owner chooses to run it.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<Hash, StoredValue>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under an explicit key, bypassing content addressing.
    /// Test helper for staging legacy-keyed or mismatched entries.
    pub fn inject(&self, hash: Hash, data: Vec<u8>, timeout: u64) {
        self.entries
            .write()
            .insert(hash, StoredValue { data, timeout });
    }

    /// Whether an entry exists under `hash`.
    #[must_use]
    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.read().contains_key(hash)
    }

    /// Drop every entry whose timeout has passed. Returns how many were
    /// dropped.
    pub fn prune_expired(&self, now: u64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, value| value.timeout >= now);
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl DasReader for MemoryStorage {
    async fn get_by_hash(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        self.entries
            .read()
            .get(hash)
            .map(|value| value.data.clone())
            .ok_or(StorageError::NotFound(*hash))
    }

    async fn expiration_policy(&self) -> Result<ExpirationPolicy, StorageError> {
        Ok(ExpirationPolicy::DiscardAfterDataTimeout)
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    async fn put(&self, value: &[u8], timeout: u64) -> Result<(), StorageError> {
        let key = hash::tree_hash(value);
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            // Re-stores only ever extend the retention window.
            Some(existing) => existing.timeout = existing.timeout.max(timeout),
            None => {
                entries.insert(
                    key,
                    StoredValue {
                        data: value.to_vec(),
                        timeout,
                    },
                );
            }
        }
        Ok(())
    }

    async fn sync(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_common::tree_hash;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStorage::new();
        let data = b"some payload";
        store.put(data, 1000).await.expect("put");

        let got = store.get_by_hash(&tree_hash(data)).await.expect("get");
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStorage::new();
        let result = store.get_by_hash(&tree_hash(b"missing")).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_put_extends_timeout() {
        let store = MemoryStorage::new();
        let data = b"keep me";
        store.put(data, 500).await.expect("put");
        store.put(data, 100).await.expect("re-put");
        assert_eq!(store.len(), 1);

        // The later, shorter timeout must not shrink retention.
        assert_eq!(store.prune_expired(400), 0);
        assert_eq!(store.prune_expired(501), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_inject_bypasses_content_addressing() {
        let store = MemoryStorage::new();
        let key = tree_hash(b"the key");
        assert!(!store.contains(&key));
        store.inject(key, b"different bytes".to_vec(), 1000);
        assert!(store.contains(&key));
        let got = store.get_by_hash(&key).await.expect("get");
        assert_eq!(got, b"different bytes");
    }

    #[tokio::test]
    async fn test_policy_and_health() {
        let store = MemoryStorage::new();
        assert_eq!(
            store.expiration_policy().await.expect("policy"),
            ExpirationPolicy::DiscardAfterDataTimeout
        );
        store.health_check().await.expect("healthy");
        store.sync().await.expect("sync");
        store.close().await.expect("close");
    }
}
