//! # DA Certificate
//!
//! A Data Availability Certificate commits a committee to holding a payload:
//! it names the committee (by keyset hash), the payload (by data hash), the
//! instant after which the payload may be discarded, and carries the
//! aggregate BLS signature of the members selected in the signers mask.
//!
//! ## Wire Format
//!
//! | Field | Size | Description |
//! |-------|------|-------------|
//! | flags | 1 | DAS header bit always set; TREE bit set iff version != 0 |
//! | keyset_hash | 32 | tree hash of the committee keyset |
//! | data_hash | 32 | payload hash (scheme chosen by version) |
//! | timeout | 8 | big-endian unix seconds |
//! | version | 0 or 1 | present iff the TREE bit is set |
//! | signers_mask | 8 | big-endian bitmap of contributing members |
//! | signature | 96 | aggregate BLS signature |
//!
//! Certificates ride at the tail of a sequencer batch frame, so
//! deserialization ignores any trailing bytes.
//!
//! ## Signable Fields
//!
//! The committee signs `data_hash ++ be_u64(timeout) ++ [version]` (version
//! byte omitted in the legacy flat-hash era). The keyset hash and the signers
//! mask are NOT signed: the keyset is bound by the quorum's out-of-band
//! commitment to it, and the mask is a selector the verifier must treat as
//! untrusted input.

use std::fmt;

use crate::bls::{Signature, SIGNATURE_LENGTH};
use crate::hash::Hash;

// ════════════════════════════════════════════════════════════════════════════
// HEADER FLAGS
// ════════════════════════════════════════════════════════════════════════════

/// Flag bit marking a sequencer batch as DAS-served.
pub const DAS_MESSAGE_HEADER_FLAG: u8 = 0x80;

/// Flag bit marking a certificate of the tree-hash era (version >= 1).
pub const TREE_DAS_MESSAGE_HEADER_FLAG: u8 = 0x08;

/// Whether a batch header byte engages this subsystem at all.
#[must_use]
pub const fn is_das_message_header_byte(header: u8) -> bool {
    header & DAS_MESSAGE_HEADER_FLAG != 0
}

/// Whether a batch header byte carries a versioned (tree-hash era) cert.
#[must_use]
pub const fn is_tree_das_message_header_byte(header: u8) -> bool {
    let bits = DAS_MESSAGE_HEADER_FLAG | TREE_DAS_MESSAGE_HEADER_FLAG;
    header & bits == bits
}

// ════════════════════════════════════════════════════════════════════════════
// CERT ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Error type for certificate deserialization.
#[derive(Debug, Clone, PartialEq)]
pub enum CertError {
    /// The leading flag byte lacks the DAS header bit.
    BadHeader {
        /// The offending flag byte.
        header: u8,
    },

    /// The input ended before the advertised content.
    Truncated {
        /// Bytes required to continue parsing.
        expected: usize,
        /// Bytes actually present.
        found: usize,
    },

    /// The signature bytes do not decode to a curve point.
    InvalidSignature {
        /// Decoder diagnostic.
        reason: String,
    },
}

impl fmt::Display for CertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertError::BadHeader { header } => {
                write!(
                    f,
                    "message header byte {:#04x} does not have the DAS header bit",
                    header
                )
            }
            CertError::Truncated { expected, found } => {
                write!(
                    f,
                    "truncated certificate: need {} bytes, found {}",
                    expected, found
                )
            }
            CertError::InvalidSignature { reason } => {
                write!(f, "invalid certificate signature: {}", reason)
            }
        }
    }
}

impl std::error::Error for CertError {}

// ════════════════════════════════════════════════════════════════════════════
// DATA AVAILABILITY CERTIFICATE
// ════════════════════════════════════════════════════════════════════════════

/// The signed tuple committing a committee to a payload hash and expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct DataAvailabilityCertificate {
    /// Tree hash of the committee keyset.
    pub keyset_hash: Hash,
    /// Payload hash; flat Keccak-256 for version 0, tree hash for version 1.
    pub data_hash: Hash,
    /// Unix seconds; earliest instant after which the payload may be dropped.
    pub timeout: u64,
    /// Bit `i` set iff committee member `i` contributed to the signature.
    pub signers_mask: u64,
    /// Aggregate BLS signature over the signable fields.
    pub sig: Signature,
    /// Hashing-scheme era: 0 = flat (legacy), 1 = tree, >= 2 unknown.
    pub version: u8,
}

impl DataAvailabilityCertificate {
    /// Serialize to the canonical wire format.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut flags = DAS_MESSAGE_HEADER_FLAG;
        if self.version != 0 {
            flags |= TREE_DAS_MESSAGE_HEADER_FLAG;
        }

        let mut buf = Vec::with_capacity(1 + 32 + 32 + 8 + 1 + 8 + SIGNATURE_LENGTH);
        buf.push(flags);
        buf.extend_from_slice(self.keyset_hash.as_bytes());
        buf.extend_from_slice(&self.serialize_signable_fields());
        buf.extend_from_slice(&self.signers_mask.to_be_bytes());
        buf.extend_from_slice(&self.sig.to_bytes());
        buf
    }

    /// Deserialize from wire bytes, ignoring anything past the certificate.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CertError> {
        let mut offset = 0usize;

        let header = take(bytes, &mut offset, 1)?[0];
        if !is_das_message_header_byte(header) {
            return Err(CertError::BadHeader { header });
        }

        let keyset_hash = take_hash(bytes, &mut offset)?;
        let data_hash = take_hash(bytes, &mut offset)?;
        let timeout = u64::from_be_bytes(
            take(bytes, &mut offset, 8)?
                .try_into()
                .expect("take returns exactly 8 bytes"),
        );

        let version = if is_tree_das_message_header_byte(header) {
            take(bytes, &mut offset, 1)?[0]
        } else {
            0
        };

        let signers_mask = u64::from_be_bytes(
            take(bytes, &mut offset, 8)?
                .try_into()
                .expect("take returns exactly 8 bytes"),
        );

        let sig_bytes = take(bytes, &mut offset, SIGNATURE_LENGTH)?;
        let sig = Signature::from_bytes(sig_bytes).map_err(|err| CertError::InvalidSignature {
            reason: err.to_string(),
        })?;

        Ok(Self {
            keyset_hash,
            data_hash,
            timeout,
            signers_mask,
            sig,
            version,
        })
    }

    /// The exact bytes the committee signs:
    /// `data_hash ++ be_u64(timeout) ++ [version iff != 0]`.
    #[must_use]
    pub fn serialize_signable_fields(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 9);
        buf.extend_from_slice(self.data_hash.as_bytes());
        buf.extend_from_slice(&self.timeout.to_be_bytes());
        if self.version != 0 {
            buf.push(self.version);
        }
        buf
    }
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], CertError> {
    let end = *offset + len;
    if end > bytes.len() {
        return Err(CertError::Truncated {
            expected: end,
            found: bytes.len(),
        });
    }
    let slice = &bytes[*offset..end];
    *offset = end;
    Ok(slice)
}

fn take_hash(bytes: &[u8], offset: &mut usize) -> Result<Hash, CertError> {
    let slice = take(bytes, offset, 32)?;
    Ok(Hash::new(
        slice.try_into().expect("take returns exactly 32 bytes"),
    ))
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
