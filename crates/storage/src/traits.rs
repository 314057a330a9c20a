//! The storage service contract shared by every backend.

use std::fmt::Debug;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use das_common::Hash;

use crate::error::StorageError;

/// Read side of a DA store: content-addressed fetch plus the retention
/// promise the backend makes. The recovery pipeline only ever borrows this.
#[async_trait]
pub trait DasReader: Send + Sync {
    /// Fetch the payload stored under `hash`.
    async fn get_by_hash(&self, hash: &Hash) -> Result<Vec<u8>, StorageError>;

    /// The retention promise this backend makes for stored payloads.
    async fn expiration_policy(&self) -> Result<ExpirationPolicy, StorageError>;
}

/// Full storage capability set. Backends may chain: a caching layer holds a
/// `base` service and implements the same contract.
///
/// Implementations must be safe for concurrent use; a wrapper is thread-safe
/// iff its base is.
#[async_trait]
pub trait StorageService: DasReader + Debug {
    /// Store `value`, to be retained at least until `timeout` (unix seconds).
    async fn put(&self, value: &[u8], timeout: u64) -> Result<(), StorageError>;

    /// Flush any buffered writes to durable storage.
    async fn sync(&self) -> Result<(), StorageError>;

    /// Release backend resources. Further calls may fail.
    async fn close(&self) -> Result<(), StorageError>;

    /// Probe backend liveness.
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Retention promise of a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationPolicy {
    /// Data is kept forever.
    KeepForever,
    /// Data is kept until the archiving node's timeout, assumed at least the
    /// minimum data timeout.
    DiscardAfterArchiveTimeout,
    /// Data is kept until the timeout the writer provided with the put call.
    DiscardAfterDataTimeout,
    /// Mixed policies behind one service (aggregators over heterogeneous
    /// backends).
    MixedTimeout,
    /// Data is never stored (empty and wrapper services).
    DiscardImmediately,
}

impl std::fmt::Display for ExpirationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExpirationPolicy::KeepForever => "KeepForever",
            ExpirationPolicy::DiscardAfterArchiveTimeout => "DiscardAfterArchiveTimeout",
            ExpirationPolicy::DiscardAfterDataTimeout => "DiscardAfterDataTimeout",
            ExpirationPolicy::MixedTimeout => "MixedTimeout",
            ExpirationPolicy::DiscardImmediately => "DiscardImmediately",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ExpirationPolicy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KeepForever" => Ok(ExpirationPolicy::KeepForever),
            "DiscardAfterArchiveTimeout" => Ok(ExpirationPolicy::DiscardAfterArchiveTimeout),
            "DiscardAfterDataTimeout" => Ok(ExpirationPolicy::DiscardAfterDataTimeout),
            "MixedTimeout" => Ok(ExpirationPolicy::MixedTimeout),
            "DiscardImmediately" => Ok(ExpirationPolicy::DiscardImmediately),
            other => Err(StorageError::Config(format!(
                "invalid expiration policy: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExpirationPolicy; 5] = [
        ExpirationPolicy::KeepForever,
        ExpirationPolicy::DiscardAfterArchiveTimeout,
        ExpirationPolicy::DiscardAfterDataTimeout,
        ExpirationPolicy::MixedTimeout,
        ExpirationPolicy::DiscardImmediately,
    ];

    #[test]
    fn test_policy_string_roundtrip() {
        for policy in ALL {
            let name = policy.to_string();
            let back: ExpirationPolicy = name.parse().expect("parse");
            assert_eq!(policy, back);
        }
    }

    #[test]
    fn test_policy_rejects_unknown_name() {
        let result: Result<ExpirationPolicy, _> = "DiscardEventually".parse();
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[test]
    fn test_policy_canonical_spellings() {
        assert_eq!(ExpirationPolicy::KeepForever.to_string(), "KeepForever");
        assert_eq!(
            ExpirationPolicy::DiscardAfterDataTimeout.to_string(),
            "DiscardAfterDataTimeout"
        );
    }
}
