//! # Signed Redis Cache
//!
//! Modul ini menyediakan `RedisStorageService`, sebuah write-through cache
//! ber-autentikasi HMAC yang membungkus `StorageService` lain sebagai base.
//!
//! ## Arsitektur
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 RedisStorageService                        │
//! ├───────────────────────────────────────────────────────────┤
//! │  GET key=<tree hash, 32 raw bytes>                         │
//! │      value = payload ‖ HMAC-Keccak256(signing_key, payload)│
//! │      │ hit + tag valid  → return payload                   │
//! │      │ miss / tag salah → base.get_by_hash()               │
//! │      │                     └─► async refresh (SET .. EX)   │
//! │  PUT → base.put() dulu, lalu SET .. EX ttl (best effort)   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Prinsip Kunci
//!
//! - Base store adalah sumber kebenaran; cache hanya akselerasi
//! - Setiap entry terikat HMAC ke kontennya, entry basi tidak mungkin
//!   lolos karena key adalah hash konten itu sendiri
//! - Kegagalan Redis pada write TIDAK menggagalkan put yang sudah
//!   di-acknowledge base store
//! - Kegagalan auth pada read jatuh ke base store, tidak pernah
//!   mengembalikan data yang tidak terverifikasi
//!
//! ## Invariant
//!
//! - Signing key immutable setelah konstruksi, tepat 32 byte hex
//! - Tag adalah 32 byte terakhir dari value; prefix adalah payload utuh
//! - TTL diterapkan per key pada setiap SET

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Deserialize;
use sha3::Keccak256;
use tracing::{debug, error, trace};

use das_common::{hash, Hash};

use crate::error::StorageError;
use crate::traits::{DasReader, ExpirationPolicy, StorageService};

type HmacKeccak256 = Hmac<Keccak256>;

/// Length of the HMAC tag appended to every cached value.
pub const HMAC_TAG_LENGTH: usize = 32;

// ════════════════════════════════════════════════════════════════════════════
// CONFIG
// ════════════════════════════════════════════════════════════════════════════

/// Configuration for the signed Redis cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Enable Redis caching of sequencer batch data.
    pub enable: bool,

    /// Redis connection URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,

    /// TTL for cached entries, in seconds.
    pub expiration_secs: u64,

    /// HMAC signing key: exactly 32 bytes of hex. Required when enabled.
    pub key_config: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            enable: false,
            url: String::new(),
            expiration_secs: 60 * 60,
            key_config: String::new(),
        }
    }
}

impl RedisConfig {
    /// Load config from a TOML file path.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|err| StorageError::Config(err.to_string()))
    }

    /// Parse the signing key. Anything but exactly 32 bytes of non-zero hex
    /// is a configuration error.
    pub fn signing_key(&self) -> Result<[u8; 32], StorageError> {
        let bytes = hex::decode(self.key_config.trim()).map_err(|err| {
            StorageError::Config(format!("signing key is not valid hex: {err}"))
        })?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            StorageError::Config(format!(
                "signing key must be exactly 32 bytes of hex, found {}",
                bytes.len()
            ))
        })?;
        if key == [0u8; 32] {
            return Err(StorageError::Config(
                "signing key must not be all zero".to_string(),
            ));
        }
        Ok(key)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HMAC HELPERS
// ════════════════════════════════════════════════════════════════════════════

/// Append `HMAC-Keccak256(key, message)` to the message in place, so a write
/// ships a single buffer.
fn sign_message(key: &[u8; 32], mut message: Vec<u8>) -> Vec<u8> {
    let mut mac = HmacKeccak256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(&message);
    let tag = mac.finalize().into_bytes();
    message.extend_from_slice(&tag);
    message
}

/// Split the trailing tag off `data`, verify it in constant time, and return
/// the authenticated prefix.
fn verify_message(key: &[u8; 32], mut data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
    if data.len() < HMAC_TAG_LENGTH {
        return Err(StorageError::CacheAuth);
    }
    let split = data.len() - HMAC_TAG_LENGTH;
    let (message, tag) = data.split_at(split);
    let mut mac = HmacKeccak256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(tag).map_err(|_| StorageError::CacheAuth)?;
    data.truncate(split);
    Ok(data)
}

// ════════════════════════════════════════════════════════════════════════════
// REDIS STORAGE SERVICE
// ════════════════════════════════════════════════════════════════════════════

/// HMAC-authenticated write-through Redis cache in front of a base store.
///
/// The cache owns its base exclusively. It is best effort: every cache
/// failure other than construction degrades to the base store.
pub struct RedisStorageService {
    base: Arc<dyn StorageService>,
    config: RedisConfig,
    signing_key: [u8; 32],
    conn: Mutex<Option<ConnectionManager>>,
}

impl std::fmt::Debug for RedisStorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorageService")
            .field("url", &self.config.url)
            .field("expiration_secs", &self.config.expiration_secs)
            .field("base", &self.base)
            .finish()
    }
}

impl RedisStorageService {
    /// Connect to Redis and wrap `base`. Fails on an invalid signing key or
    /// an unreachable server.
    pub async fn new(
        config: RedisConfig,
        base: Arc<dyn StorageService>,
    ) -> Result<Self, StorageError> {
        let signing_key = config.signing_key()?;
        let client = redis::Client::open(config.url.as_str())
            .map_err(|err| StorageError::Config(format!("invalid redis url: {err}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| StorageError::Transport(err.to_string()))?;
        Ok(Self {
            base,
            config,
            signing_key,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn connection(&self) -> Result<ConnectionManager, StorageError> {
        self.conn
            .lock()
            .clone()
            .ok_or_else(|| StorageError::Transport("redis client is closed".to_string()))
    }

    /// Fetch and authenticate a cached entry.
    async fn get_cached(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let mut conn = self.connection()?;
        let data: Option<Vec<u8>> = conn
            .get(hash.as_bytes().to_vec())
            .await
            .map_err(|err| StorageError::Transport(err.to_string()))?;
        let data = data.ok_or(StorageError::NotFound(*hash))?;
        verify_message(&self.signing_key, data)
    }

    /// Re-cache an entry fetched from the base store. Fire and forget:
    /// the caller already has the payload, a failed refresh only costs the
    /// next reader a base fetch.
    fn refresh_entry(&self, hash: Hash, value: &[u8]) {
        let Ok(mut conn) = self.connection() else {
            return;
        };
        let signed = sign_message(&self.signing_key, value.to_vec());
        let ttl = self.config.expiration_secs;
        tokio::spawn(async move {
            if let Err(err) = conn
                .set_ex::<_, _, ()>(hash.as_bytes().to_vec(), signed, ttl)
                .await
            {
                debug!(hash = %hash.short_hex(), error = %err, "redis cache refresh failed");
            }
        });
    }
}

#[async_trait]
impl DasReader for RedisStorageService {
    async fn get_by_hash(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        trace!(hash = %hash.short_hex(), "redis cache get");
        match self.get_cached(hash).await {
            Ok(value) => Ok(value),
            Err(err) => {
                // A present-but-tampered entry is an integrity signal worth
                // surfacing; a plain miss is routine.
                if matches!(err, StorageError::CacheAuth) {
                    error!(hash = %hash.short_hex(), "cached entry failed HMAC authentication");
                } else {
                    debug!(hash = %hash.short_hex(), error = %err, "redis cache miss");
                }
                let value = self.base.get_by_hash(hash).await?;
                self.refresh_entry(*hash, &value);
                Ok(value)
            }
        }
    }

    async fn expiration_policy(&self) -> Result<ExpirationPolicy, StorageError> {
        self.base.expiration_policy().await
    }
}

#[async_trait]
impl StorageService for RedisStorageService {
    async fn put(&self, value: &[u8], timeout: u64) -> Result<(), StorageError> {
        trace!(len = value.len(), timeout, "redis cache put");
        // The base store is authoritative: its failure fails the put, a
        // cache failure after its ack does not.
        self.base.put(value, timeout).await?;

        let key = hash::tree_hash(value);
        let signed = sign_message(&self.signing_key, value.to_vec());
        match self.connection() {
            Ok(mut conn) => {
                if let Err(err) = conn
                    .set_ex::<_, _, ()>(key.as_bytes().to_vec(), signed, self.config.expiration_secs)
                    .await
                {
                    error!(hash = %key.short_hex(), error = %err, "redis cache store failed");
                }
            }
            Err(err) => {
                error!(hash = %key.short_hex(), error = %err, "redis cache store failed");
            }
        }
        Ok(())
    }

    async fn sync(&self) -> Result<(), StorageError> {
        self.base.sync().await
    }

    async fn close(&self) -> Result<(), StorageError> {
        // Drop the Redis connection before delegating.
        self.conn.lock().take();
        self.base.close().await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| StorageError::Unhealthy(format!("redis: {err}")))?;
        self.base.health_check().await
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY: [u8; 32] = [0x5a; 32];

    // ────────────────────────────────────────────────────────────────────────
    // CONFIG TESTS
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_config_defaults() {
        let config = RedisConfig::default();
        assert!(!config.enable);
        assert_eq!(config.expiration_secs, 3600);
        assert!(config.url.is_empty());
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
                enable = true
                url = "redis://127.0.0.1:6379"
                expiration_secs = 120
                key_config = "{}"
            "#,
            hex::encode(KEY)
        )
        .expect("write");

        let config = RedisConfig::load_from_file(file.path()).expect("load");
        assert!(config.enable);
        assert_eq!(config.expiration_secs, 120);
        assert_eq!(config.signing_key().expect("key"), KEY);
    }

    #[test]
    fn test_signing_key_valid() {
        let config = RedisConfig {
            key_config: hex::encode(KEY),
            ..RedisConfig::default()
        };
        assert_eq!(config.signing_key().expect("key"), KEY);
    }

    #[test]
    fn test_signing_key_rejects_bad_inputs() {
        for key_config in [
            "",                      // empty
            "zz",                    // not hex
            "abcd",                  // too short
            &"ab".repeat(33),        // too long
            &"00".repeat(32),        // all zero
        ] {
            let config = RedisConfig {
                key_config: key_config.to_string(),
                ..RedisConfig::default()
            };
            assert!(
                matches!(config.signing_key(), Err(StorageError::Config(_))),
                "key config {key_config:?} must be rejected"
            );
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // HMAC TESTS
    // ────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_sign_verify_roundtrip() {
        let payload = b"cached payload bytes".to_vec();
        let signed = sign_message(&KEY, payload.clone());
        assert_eq!(signed.len(), payload.len() + HMAC_TAG_LENGTH);
        assert_eq!(&signed[..payload.len()], payload.as_slice());

        let verified = verify_message(&KEY, signed).expect("verify");
        assert_eq!(verified, payload);
    }

    #[test]
    fn test_verify_detects_payload_tamper() {
        let mut signed = sign_message(&KEY, b"original".to_vec());
        signed[0] ^= 0x01;
        assert!(matches!(
            verify_message(&KEY, signed),
            Err(StorageError::CacheAuth)
        ));
    }

    #[test]
    fn test_verify_detects_tag_tamper() {
        let mut signed = sign_message(&KEY, b"original".to_vec());
        let len = signed.len();
        signed[len - 1] ^= 0x01;
        assert!(matches!(
            verify_message(&KEY, signed),
            Err(StorageError::CacheAuth)
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let signed = sign_message(&KEY, b"payload".to_vec());
        let other_key = [0xa5; 32];
        assert!(matches!(
            verify_message(&other_key, signed),
            Err(StorageError::CacheAuth)
        ));
    }

    #[test]
    fn test_verify_rejects_short_data() {
        assert!(matches!(
            verify_message(&KEY, vec![0u8; HMAC_TAG_LENGTH - 1]),
            Err(StorageError::CacheAuth)
        ));
    }

    #[test]
    fn test_empty_payload_signs() {
        let signed = sign_message(&KEY, Vec::new());
        assert_eq!(signed.len(), HMAC_TAG_LENGTH);
        let verified = verify_message(&KEY, signed).expect("verify");
        assert!(verified.is_empty());
    }
}
