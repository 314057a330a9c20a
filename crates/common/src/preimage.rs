//! Preimage recording for replay verifiers.
//! Recovery optionally records every `(hash, bytes, type)` tuple it touches
//! so a verifier can re-derive the same lookups without the store.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::hash::Hash;

/// The hash function a recorded preimage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreimageType {
    Keccak256,
    Sha2_256,
    EthVersionedHash,
}

impl std::fmt::Display for PreimageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreimageType::Keccak256 => write!(f, "Keccak256Preimage"),
            PreimageType::Sha2_256 => write!(f, "Sha2_256Preimage"),
            PreimageType::EthVersionedHash => write!(f, "EthVersionedHashPreimage"),
        }
    }
}

/// Append-only map of recorded preimages, safe for concurrent inserts.
///
/// Recording the same `(type, hash)` with identical bytes is idempotent.
/// Recording it with different bytes means two preimages collided under one
/// hash, which is a bug in the caller, and asserts.
#[derive(Debug, Default)]
pub struct PreimageSet {
    entries: Mutex<HashMap<PreimageType, HashMap<Hash, Vec<u8>>>>,
}

impl PreimageSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a preimage. Idempotent for identical bytes; panics on a
    /// divergent re-record of the same key.
    pub fn record(&self, hash: Hash, bytes: &[u8], preimage_type: PreimageType) {
        let mut entries = self.entries.lock();
        let by_hash = entries.entry(preimage_type).or_default();
        match by_hash.get(&hash) {
            Some(existing) => {
                assert!(
                    existing.as_slice() == bytes,
                    "conflicting preimage recorded for {preimage_type} {hash}"
                );
            }
            None => {
                by_hash.insert(hash, bytes.to_vec());
            }
        }
    }

    /// Look up a recorded preimage.
    #[must_use]
    pub fn get(&self, preimage_type: PreimageType, hash: &Hash) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .get(&preimage_type)
            .and_then(|by_hash| by_hash.get(hash))
            .cloned()
    }

    /// Total number of recorded preimages across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the set into its nested map form.
    #[must_use]
    pub fn into_map(self) -> HashMap<PreimageType, HashMap<Hash, Vec<u8>>> {
        self.entries.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;
    use std::sync::Arc;

    #[test]
    fn test_record_and_get() {
        let set = PreimageSet::new();
        let data = b"preimage bytes";
        let hash = keccak256(data);

        set.record(hash, data, PreimageType::Keccak256);
        assert_eq!(
            set.get(PreimageType::Keccak256, &hash).as_deref(),
            Some(data.as_slice())
        );
        assert_eq!(set.get(PreimageType::Sha2_256, &hash), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_record_idempotent() {
        let set = PreimageSet::new();
        let data = b"same bytes";
        let hash = keccak256(data);

        set.record(hash, data, PreimageType::Keccak256);
        set.record(hash, data, PreimageType::Keccak256);
        assert_eq!(set.len(), 1);
    }

    #[test]
    #[should_panic(expected = "conflicting preimage")]
    fn test_record_conflict_asserts() {
        let set = PreimageSet::new();
        let hash = keccak256(b"a");
        set.record(hash, b"a", PreimageType::Keccak256);
        set.record(hash, b"b", PreimageType::Keccak256);
    }

    #[test]
    fn test_same_hash_different_types_coexist() {
        let set = PreimageSet::new();
        let hash = keccak256(b"x");
        set.record(hash, b"x", PreimageType::Keccak256);
        set.record(hash, b"y", PreimageType::Sha2_256);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts() {
        let set = Arc::new(PreimageSet::new());
        let mut handles = Vec::new();
        for t in 0..4u8 {
            let set = Arc::clone(&set);
            handles.push(std::thread::spawn(move || {
                for i in 0..50u8 {
                    let data = [t % 2, i];
                    set.record(keccak256(&data), &data, PreimageType::Keccak256);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread");
        }
        // Two distinct first bytes times fifty second bytes: all inserts
        // landed, duplicates collapsed.
        assert_eq!(set.len(), 100);
    }

    #[test]
    fn test_into_map_shape() {
        let set = PreimageSet::new();
        let hash = keccak256(b"m");
        set.record(hash, b"m", PreimageType::Keccak256);
        let map = set.into_map();
        assert_eq!(
            map[&PreimageType::Keccak256][&hash],
            b"m".to_vec()
        );
    }

    #[test]
    fn test_type_display_names() {
        assert_eq!(PreimageType::Keccak256.to_string(), "Keccak256Preimage");
        assert_eq!(PreimageType::Sha2_256.to_string(), "Sha2_256Preimage");
        assert_eq!(
            PreimageType::EthVersionedHash.to_string(),
            "EthVersionedHashPreimage"
        );
    }
}
