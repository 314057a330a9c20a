//! # DAS Keyset
//!
//! A keyset describes one data availability committee: the ordered BLS
//! public keys of its members and the `assumed_honest` threshold, the
//! minimum number of members assumed not to collude. Keysets are immutable
//! and content-addressed: everywhere else in the system they are identified
//! by the tree hash of their serialized form.
//!
//! ## Wire Format (big-endian)
//!
//! | Field | Size | Description |
//! |-------|------|-------------|
//! | assumed_honest | 8 | honest-minority threshold (u64) |
//! | num_keys | 8 | number of public keys, at most 64 (u64) |
//! | per key: pk_len | 2 | public key blob length (u16) |
//! | per key: pk_bytes | pk_len | compressed BLS public key |
//!
//! The 64-key bound exists because signer sets are addressed by a 64-bit
//! bitmask. The serialized form must fit in one hash bin
//! ([`crate::hash::BIN_SIZE`]) or the keyset has no valid hash.
//!
//! ## Quorum Predicate
//!
//! A signature over `data` by the members selected in `signers_mask` is
//! accepted when `non_signers < assumed_honest`: if fewer members are
//! missing than the number assumed honest, at least one honest member
//! signed, so the data is available.

use std::fmt;

use crate::bls::{self, PublicKey, Signature};
use crate::hash::{self, Hash, BIN_SIZE};

// ════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ════════════════════════════════════════════════════════════════════════════

/// Maximum number of committee members, bounded by the 64-bit signers mask.
pub const MAX_KEYSET_KEYS: u64 = 64;

// ════════════════════════════════════════════════════════════════════════════
// KEYSET ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Error type for keyset codec and signature verification operations.
#[derive(Debug, Clone, PartialEq)]
pub enum KeysetError {
    /// More keys than the signers mask can address.
    TooManyKeys {
        /// Number of keys in the serialized keyset.
        count: u64,
    },

    /// Serialized keyset exceeds one hash bin and therefore has no hash.
    TooLarge {
        /// Serialized size in bytes.
        size: usize,
    },

    /// Serialized keyset ended before the advertised content.
    Truncated {
        /// Bytes required to continue parsing.
        expected: usize,
        /// Bytes actually present.
        found: usize,
    },

    /// A public key blob failed to decode or validate.
    InvalidPublicKey {
        /// Index of the offending key.
        index: u64,
        /// Decoder diagnostic.
        reason: String,
    },

    /// The signers mask selects too few members to meet the quorum predicate.
    NotEnoughSigners {
        /// Members missing from the mask.
        non_signers: u64,
        /// Honest-minority threshold.
        assumed_honest: u64,
    },

    /// The signers mask addresses members beyond the keyset.
    InvalidSignersMask {
        /// The offending mask.
        signers_mask: u64,
        /// Number of members in the keyset.
        num_keys: usize,
    },

    /// The aggregate signature did not verify.
    BadSignature,
}

impl fmt::Display for KeysetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeysetError::TooManyKeys { count } => {
                write!(
                    f,
                    "too many keys in serialized keyset: {} (max {})",
                    count, MAX_KEYSET_KEYS
                )
            }
            KeysetError::TooLarge { size } => {
                write!(
                    f,
                    "serialized keyset too large: {} bytes (max {})",
                    size, BIN_SIZE
                )
            }
            KeysetError::Truncated { expected, found } => {
                write!(
                    f,
                    "truncated keyset: need {} bytes, found {}",
                    expected, found
                )
            }
            KeysetError::InvalidPublicKey { index, reason } => {
                write!(f, "invalid public key at index {}: {}", index, reason)
            }
            KeysetError::NotEnoughSigners {
                non_signers,
                assumed_honest,
            } => {
                write!(
                    f,
                    "not enough signers: {} non-signers with assumed honest {}",
                    non_signers, assumed_honest
                )
            }
            KeysetError::InvalidSignersMask {
                signers_mask,
                num_keys,
            } => {
                write!(
                    f,
                    "signers mask {:#x} addresses members beyond the {}-key keyset",
                    signers_mask, num_keys
                )
            }
            KeysetError::BadSignature => write!(f, "bad signature"),
        }
    }
}

impl std::error::Error for KeysetError {}

// ════════════════════════════════════════════════════════════════════════════
// KEYSET
// ════════════════════════════════════════════════════════════════════════════

/// An immutable DA committee descriptor.
///
/// Members are stored in the order given; the signers mask indexes into
/// that order, so the constructor never sorts or deduplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyset {
    /// Minimum number of members assumed not to collude.
    assumed_honest: u64,

    /// Ordered committee public keys. Bit `i` of a signers mask selects
    /// `pub_keys[i]`.
    pub_keys: Vec<PublicKey>,
}

impl Keyset {
    /// Create a keyset, rejecting committees the signers mask cannot address.
    pub fn new(assumed_honest: u64, pub_keys: Vec<PublicKey>) -> Result<Self, KeysetError> {
        if pub_keys.len() as u64 > MAX_KEYSET_KEYS {
            return Err(KeysetError::TooManyKeys {
                count: pub_keys.len() as u64,
            });
        }
        Ok(Self {
            assumed_honest,
            pub_keys,
        })
    }

    #[must_use]
    #[inline]
    pub const fn assumed_honest(&self) -> u64 {
        self.assumed_honest
    }

    #[must_use]
    #[inline]
    pub fn pub_keys(&self) -> &[PublicKey] {
        &self.pub_keys
    }

    #[must_use]
    #[inline]
    pub fn num_keys(&self) -> usize {
        self.pub_keys.len()
    }

    // ────────────────────────────────────────────────────────────────────────
    // WIRE CODEC
    // ────────────────────────────────────────────────────────────────────────

    /// Serialize to the canonical wire format.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.pub_keys.len() * (2 + bls::PUBLIC_KEY_LENGTH));
        buf.extend_from_slice(&self.assumed_honest.to_be_bytes());
        buf.extend_from_slice(&(self.pub_keys.len() as u64).to_be_bytes());
        for pk in &self.pub_keys {
            let pk_bytes = pk.to_bytes();
            buf.extend_from_slice(&(pk_bytes.len() as u16).to_be_bytes());
            buf.extend_from_slice(&pk_bytes);
        }
        buf
    }

    /// Deserialize from the canonical wire format.
    ///
    /// With `validate` set, every public key point is fully checked. Skip
    /// validation only when the keyset hash was already verified against a
    /// trusted commitment.
    pub fn deserialize(bytes: &[u8], validate: bool) -> Result<Self, KeysetError> {
        let mut offset = 0usize;

        let assumed_honest = u64::from_be_bytes(
            take(bytes, &mut offset, 8)?
                .try_into()
                .expect("take returns exactly 8 bytes"),
        );
        let num_keys = u64::from_be_bytes(
            take(bytes, &mut offset, 8)?
                .try_into()
                .expect("take returns exactly 8 bytes"),
        );
        if num_keys > MAX_KEYSET_KEYS {
            return Err(KeysetError::TooManyKeys { count: num_keys });
        }

        let mut pub_keys = Vec::with_capacity(num_keys as usize);
        for index in 0..num_keys {
            let pk_len = u16::from_be_bytes(
                take(bytes, &mut offset, 2)?
                    .try_into()
                    .expect("take returns exactly 2 bytes"),
            );
            let pk_bytes = take(bytes, &mut offset, pk_len as usize)?;
            let pk = PublicKey::from_bytes(pk_bytes, validate).map_err(|err| {
                KeysetError::InvalidPublicKey {
                    index,
                    reason: err.to_string(),
                }
            })?;
            pub_keys.push(pk);
        }

        Ok(Self {
            assumed_honest,
            pub_keys,
        })
    }

    /// The keyset's content address: the tree hash of its serialized form.
    ///
    /// Fails when the serialized form exceeds one hash bin.
    pub fn hash(&self) -> Result<Hash, KeysetError> {
        let serialized = self.serialize();
        if serialized.len() > BIN_SIZE {
            return Err(KeysetError::TooLarge {
                size: serialized.len(),
            });
        }
        Ok(hash::tree_hash(&serialized))
    }

    // ────────────────────────────────────────────────────────────────────────
    // SIGNATURE VERIFICATION
    // ────────────────────────────────────────────────────────────────────────

    /// Verify an aggregate signature over `data` by the members selected in
    /// `signers_mask`.
    ///
    /// The mask is a selector chosen by the sender and is itself unsigned;
    /// this is sound only because acceptance requires
    /// `non_signers < assumed_honest` and the keyset is bound by its hash.
    /// A sender excluding honest members from the mask can only make
    /// verification fail, never pass with fewer real signers.
    pub fn verify_signature(
        &self,
        signers_mask: u64,
        data: &[u8],
        sig: &Signature,
    ) -> Result<(), KeysetError> {
        // Validation 1: the mask must not address members beyond the keyset.
        if self.pub_keys.len() < 64 && signers_mask >> self.pub_keys.len() != 0 {
            return Err(KeysetError::InvalidSignersMask {
                signers_mask,
                num_keys: self.pub_keys.len(),
            });
        }

        // Validation 2: quorum predicate.
        let mut signers = Vec::new();
        let mut non_signers = 0u64;
        for (i, pk) in self.pub_keys.iter().enumerate() {
            if signers_mask & (1u64 << i) != 0 {
                signers.push(pk.clone());
            } else {
                non_signers += 1;
            }
        }
        if non_signers >= self.assumed_honest {
            return Err(KeysetError::NotEnoughSigners {
                non_signers,
                assumed_honest: self.assumed_honest,
            });
        }

        // Validation 3: aggregate signature.
        let aggregated =
            bls::aggregate_public_keys(&signers).map_err(|_| KeysetError::BadSignature)?;
        match bls::verify_signature(sig, data, &aggregated) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(KeysetError::BadSignature),
        }
    }
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], KeysetError> {
    let end = offset
        .checked_add(len)
        .ok_or(KeysetError::Truncated {
            expected: usize::MAX,
            found: bytes.len(),
        })?;
    if end > bytes.len() {
        return Err(KeysetError::Truncated {
            expected: end,
            found: bytes.len(),
        });
    }
    let slice = &bytes[*offset..end];
    *offset = end;
    Ok(slice)
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
