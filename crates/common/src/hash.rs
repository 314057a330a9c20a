//! Content hashing for the DAS subsystem.
//! Exposes the flat Keccak-256 hash, the binned tree hash used for content
//! addressing, and the bridge from legacy flat hashes to tree hashes.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;

use crate::preimage::{PreimageSet, PreimageType};

/// Bin size for the tree hash: payloads are split into 64 KiB bins.
/// Fixed at compile time; keyset serialization relies on it as an upper bound.
pub const BIN_SIZE: usize = 64 * 1024;

/// Domain tag prepended to leaf node preimages.
pub const LEAF_BYTE: u8 = 0xfe;

/// Domain tag prepended to internal node preimages.
pub const NODE_BYTE: u8 = 0xff;

/// A 32-byte hash value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Wrap raw 32 bytes as a hash.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw 32 bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex string of the full hash.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix form useful for logging (first 8 hex chars).
    #[must_use]
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

/// Compute Keccak-256 of the input (the flat hash).
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash(hasher.finalize().into())
}

/// Compute the tree hash of the input.
///
/// The input is split into bins of at most [`BIN_SIZE`] bytes. Each bin
/// becomes a leaf `keccak256(LEAF_BYTE ++ keccak256(bin))`. Leaves are
/// pair-reduced with `keccak256(NODE_BYTE ++ left ++ right ++ be_u32(size))`
/// where `size` is the payload size under the node; an odd node carries up
/// unchanged. Empty input hashes as a single empty bin.
#[must_use]
pub fn tree_hash(data: &[u8]) -> Hash {
    hash_impl(data, &mut |_, _| {})
}

/// Compute the tree hash while recording every Keccak preimage encountered
/// (content bins, leaf nodes, internal nodes) into `set`.
///
/// The recorded tuples are consumed by replay verifiers and must stay
/// bit-identical across implementations.
pub fn record_tree_hash(data: &[u8], set: &PreimageSet) -> Hash {
    hash_impl(data, &mut |hash, preimage| {
        set.record(hash, preimage, PreimageType::Keccak256);
    })
}

/// Constant-time check that `expected` is the tree hash of `data`.
#[must_use]
pub fn valid_tree_hash(expected: &Hash, data: &[u8]) -> bool {
    let actual = tree_hash(data);
    expected.0.ct_eq(&actual.0).into()
}

/// The tree leaf whose content hash is the given flat hash: `LEAF_BYTE ++ flat`.
#[must_use]
pub fn flat_hash_to_tree_leaf(flat: &Hash) -> [u8; 33] {
    let mut leaf = [0u8; 33];
    leaf[0] = LEAF_BYTE;
    leaf[1..].copy_from_slice(flat.as_bytes());
    leaf
}

/// Bridge a legacy flat hash to the tree hash of its single-leaf form.
///
/// For any payload `p` of at most [`BIN_SIZE`] bytes,
/// `flat_hash_to_tree_hash(keccak256(p)) == tree_hash(p)`, which lets stores
/// keyed by tree hash serve entries committed under the legacy flat hash.
#[must_use]
pub fn flat_hash_to_tree_hash(flat: &Hash) -> Hash {
    keccak256(&flat_hash_to_tree_leaf(flat))
}

struct TreeNode {
    hash: Hash,
    size: u32,
}

fn keccord(record: &mut dyn FnMut(Hash, &[u8]), value: &[u8]) -> Hash {
    let hash = keccak256(value);
    record(hash, value);
    hash
}

fn hash_impl(data: &[u8], record: &mut dyn FnMut(Hash, &[u8])) -> Hash {
    if data.is_empty() {
        let inner = keccord(record, &[]);
        return keccord(record, &flat_hash_to_tree_leaf(&inner));
    }

    // Leaf layer: one node per bin.
    let mut layer: Vec<TreeNode> = Vec::with_capacity(data.len().div_ceil(BIN_SIZE));
    for bin in data.chunks(BIN_SIZE) {
        let inner = keccord(record, bin);
        layer.push(TreeNode {
            hash: keccord(record, &flat_hash_to_tree_leaf(&inner)),
            size: bin.len() as u32,
        });
    }

    // Pair-reduce upward; an odd trailing node bubbles up unchanged.
    while layer.len() > 1 {
        let mut paired = Vec::with_capacity(layer.len() / 2 + layer.len() % 2);
        for pair in layer.chunks(2) {
            if let [left, right] = pair {
                let size = left.size + right.size;
                let mut node = [0u8; 69];
                node[0] = NODE_BYTE;
                node[1..33].copy_from_slice(left.hash.as_bytes());
                node[33..65].copy_from_slice(right.hash.as_bytes());
                node[65..].copy_from_slice(&size.to_be_bytes());
                paired.push(TreeNode {
                    hash: keccord(record, &node),
                    size,
                });
            } else {
                paired.push(TreeNode {
                    hash: pair[0].hash,
                    size: pair[0].size,
                });
            }
        }
        layer = paired;
    }
    layer[0].hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_known_vector() {
        // keccak256("") is the well-known empty hash.
        let h = keccak256(&[]);
        assert_eq!(
            h.to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_tree_hash_deterministic() {
        let data = b"some payload bytes";
        assert_eq!(tree_hash(data), tree_hash(data));
    }

    #[test]
    fn test_tree_hash_differs_from_flat() {
        let data = b"short payload";
        assert_ne!(tree_hash(data), keccak256(data));
    }

    #[test]
    fn test_tree_hash_empty_input() {
        let empty = tree_hash(&[]);
        // Empty input is a single empty bin, not the zero hash.
        assert_ne!(empty, Hash::default());
        assert_eq!(empty, flat_hash_to_tree_hash(&keccak256(&[])));
    }

    #[test]
    fn test_single_bin_matches_flat_bridge() {
        // Anything that fits in one bin hashes to the bridged flat hash.
        let data = vec![0xAA; 100];
        assert_eq!(tree_hash(&data), flat_hash_to_tree_hash(&keccak256(&data)));

        let exactly_one_bin = vec![0x42; BIN_SIZE];
        assert_eq!(
            tree_hash(&exactly_one_bin),
            flat_hash_to_tree_hash(&keccak256(&exactly_one_bin))
        );
    }

    #[test]
    fn test_bin_boundary() {
        let at_boundary = vec![0x11; BIN_SIZE];
        let past_boundary = vec![0x11; BIN_SIZE + 1];
        assert_ne!(tree_hash(&at_boundary), tree_hash(&past_boundary));
        // Past the boundary the root is an internal node, so the flat bridge
        // no longer applies.
        assert_ne!(
            tree_hash(&past_boundary),
            flat_hash_to_tree_hash(&keccak256(&past_boundary))
        );
    }

    #[test]
    fn test_valid_tree_hash() {
        let data = b"check me";
        let h = tree_hash(data);
        assert!(valid_tree_hash(&h, data));
        assert!(!valid_tree_hash(&h, b"check me!"));
        assert!(!valid_tree_hash(&Hash::default(), data));
    }

    #[test]
    fn test_flat_hash_to_tree_leaf_layout() {
        let flat = keccak256(b"x");
        let leaf = flat_hash_to_tree_leaf(&flat);
        assert_eq!(leaf[0], LEAF_BYTE);
        assert_eq!(&leaf[1..], flat.as_bytes());
        assert_eq!(flat_hash_to_tree_hash(&flat), keccak256(&leaf));
    }

    #[test]
    fn test_record_tree_hash_records_content_and_nodes() {
        let data = vec![0xCD; 200];
        let set = PreimageSet::new();
        let root = record_tree_hash(&data, &set);
        assert_eq!(root, tree_hash(&data));

        // The content bin and the leaf node are both recorded.
        assert_eq!(
            set.get(PreimageType::Keccak256, &keccak256(&data)).as_deref(),
            Some(data.as_slice())
        );
        let leaf = flat_hash_to_tree_leaf(&keccak256(&data));
        assert_eq!(
            set.get(PreimageType::Keccak256, &root).as_deref(),
            Some(&leaf[..])
        );
    }

    #[test]
    fn test_record_tree_hash_multi_bin_records_internal_nodes() {
        let data = vec![0xEF; BIN_SIZE * 2 + 5];
        let set = PreimageSet::new();
        let root = record_tree_hash(&data, &set);

        // Three bins, three leaves, two internal nodes: the root preimage is
        // an internal node starting with the NODE_BYTE tag.
        let root_preimage = set
            .get(PreimageType::Keccak256, &root)
            .expect("root preimage recorded");
        assert_eq!(root_preimage[0], NODE_BYTE);
        assert_eq!(root_preimage.len(), 69);
        let size = u32::from_be_bytes(root_preimage[65..].try_into().expect("4 bytes"));
        assert_eq!(size as usize, data.len());
    }

    #[test]
    fn test_hash_hex_display() {
        let h = Hash::new([0xab; 32]);
        assert_eq!(h.to_hex().len(), 64);
        assert!(h.to_hex().starts_with("abab"));
        assert_eq!(h.short_hex(), "abababab");
        assert_eq!(format!("{}", h), h.to_hex());
    }

    #[test]
    fn test_hash_serde_roundtrip() {
        let h = tree_hash(b"serde me");
        let json = serde_json::to_string(&h).expect("serialize");
        let back: Hash = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(h, back);
    }
}
