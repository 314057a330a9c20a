//! Error type shared by every storage backend.

use das_common::Hash;
use thiserror::Error;

/// Error type for [`crate::StorageService`] operations.
///
/// `NotFound` and `BatchToDasFailed` are sentinels that cross the subsystem
/// boundary: the rollup's outer layer matches on them to pick a fallback.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no record found for hash {0}")]
    NotFound(Hash),

    #[error("storage transport failure: {0}")]
    Transport(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("cached entry failed HMAC authentication")]
    CacheAuth,

    #[error("storage backend unhealthy: {0}")]
    Unhealthy(String),

    #[error("unable to batch to DAS")]
    BatchToDasFailed,

    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error is a plain missing-entry miss rather than a fault.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_common::keccak256;

    #[test]
    fn test_not_found_carries_hash() {
        let hash = keccak256(b"missing");
        let err = StorageError::NotFound(hash);
        assert!(err.is_not_found());
        assert!(err.to_string().contains(&hash.to_hex()));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!err.is_not_found());
    }
}
