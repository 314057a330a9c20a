//! # Batch Recovery Pipeline
//!
//! Modul ini menyediakan mekanisme recovery payload dari sequencer batch
//! yang dilayani oleh Data Availability committee.
//!
//! ## Recovery Flow
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Recovery Process                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  1. Parse certificate dari sequencer_msg[40..]               │
//! │  2. Tolak version yang tidak dikenal (>= 2)                  │
//! │  3. Fetch keyset preimage via keyset fetcher                 │
//! │  4. Deserialize keyset, verify aggregate signature           │
//! │  5. Check timeout terhadap max_timestamp + MIN_LIFETIME      │
//! │  6. Fetch payload (bridged hash, legacy fallback)            │
//! │  7. Verify payload hash sesuai scheme version                │
//! │  8. Record preimages (optional)                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Soft-skip vs Hard Error
//!
//! Pembedaan ini load-bearing. Batch yang bukan DAS batch, certificate
//! dengan version tidak dikenal, signature yang gagal verify, atau timeout
//! yang terlalu dekat menghasilkan [`RecoveryOutcome::NotADaBatch`] /
//! [`RecoveryOutcome::Rejected`]; rollup jatuh kembali ke calldata on-chain.
//! Kegagalan transport ke store dan hash mismatch adalah hard error:
//! replay worker berhenti menunggu operator.
//!
//! ## Invariant
//!
//! - Payload yang dikembalikan SELALU cocok dengan `data_hash` di bawah
//!   scheme yang dipilih `version`
//! - Recovery TIDAK menyimpan state; reader hanya dipinjam selama call
//! - Preimage tuples bit-identical lintas implementasi

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

use das_common::cert::{self, DataAvailabilityCertificate};
use das_common::hash::{self, Hash};
use das_common::keyset::{Keyset, KeysetError};
use das_common::preimage::{PreimageSet, PreimageType};

use crate::error::StorageError;
use crate::traits::DasReader;

// ════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ════════════════════════════════════════════════════════════════════════════

/// Minimum remaining validity a certificate must have at consumption time:
/// one week, in seconds.
pub const MIN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Byte offset of the serialized certificate within a sequencer batch frame.
const CERT_OFFSET: usize = 40;

/// Byte range of the big-endian `max_timestamp` within the frame header.
const MAX_TIMESTAMP_RANGE: std::ops::Range<usize> = 8..16;

// ════════════════════════════════════════════════════════════════════════════
// OUTCOME & ERRORS
// ════════════════════════════════════════════════════════════════════════════

/// Result of recovering one sequencer batch.
///
/// Only [`RecoveryOutcome::Payload`] carries data; the other variants tell
/// the outer layer "this batch is not served from DA by this node", which is
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// The recovered, hash-verified payload.
    Payload(Vec<u8>),
    /// The frame does not carry a parseable DAS certificate.
    NotADaBatch,
    /// A well-formed certificate this verifier must reject.
    Rejected(RejectReason),
}

impl RecoveryOutcome {
    /// The payload, if recovery produced one.
    #[must_use]
    pub fn payload(self) -> Option<Vec<u8>> {
        match self {
            RecoveryOutcome::Payload(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Why a well-formed certificate was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Certificate version newer than this node understands.
    UnsupportedVersion(u8),
    /// The aggregate signature or quorum predicate failed.
    SignatureVerification(KeysetError),
    /// The certificate expires before the minimum lifetime window.
    ExpiresTooSoon {
        /// Certificate timeout, unix seconds.
        timeout: u64,
        /// `max_timestamp + MIN_LIFETIME_SECS`.
        required: u64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnsupportedVersion(version) => {
                write!(f, "unsupported certificate version {}", version)
            }
            RejectReason::SignatureVerification(err) => {
                write!(f, "signature verification failed: {}", err)
            }
            RejectReason::ExpiresTooSoon { timeout, required } => {
                write!(
                    f,
                    "certificate expires too soon: timeout {}, required at least {}",
                    timeout, required
                )
            }
        }
    }
}

/// Hard recovery failures, context-wrapped for the operator.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("couldn't get keyset {keyset_hash} for batch {batch_num}")]
    KeysetFetch {
        batch_num: u64,
        keyset_hash: Hash,
        #[source]
        source: StorageError,
    },

    #[error("couldn't deserialize keyset {keyset_hash} for batch {batch_num}")]
    SeqMsgValidation {
        batch_num: u64,
        keyset_hash: Hash,
        #[source]
        source: KeysetError,
    },

    #[error("couldn't fetch DAS batch contents under {data_hash} for batch {batch_num}")]
    PayloadFetch {
        batch_num: u64,
        data_hash: Hash,
        #[source]
        source: StorageError,
    },

    #[error("result does not match expected hash {data_hash} (certificate version {version})")]
    HashMismatch { data_hash: Hash, version: u8 },

    #[error("keyset {keyset_hash} does not match its certificate")]
    KeysetHashMismatch { keyset_hash: Hash },

    #[error("couldn't deserialize keyset {keyset_hash}")]
    KeysetDecode {
        keyset_hash: Hash,
        #[source]
        source: KeysetError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ════════════════════════════════════════════════════════════════════════════
// COLLABORATOR TRAITS
// ════════════════════════════════════════════════════════════════════════════

/// Source of keyset preimages, addressed by keyset hash.
#[async_trait]
pub trait DasKeysetFetcher: Send + Sync {
    async fn get_keyset_by_hash(&self, hash: &Hash) -> Result<Vec<u8>, StorageError>;
}

/// Write side of a DA committee: stores a message until `timeout` and
/// returns the quorum-signed certificate. Committee coordination lives
/// behind this trait, outside this subsystem.
#[async_trait]
pub trait DasWriter: Send + Sync {
    async fn store(
        &self,
        message: &[u8],
        timeout: u64,
    ) -> Result<DataAvailabilityCertificate, StorageError>;
}

// ════════════════════════════════════════════════════════════════════════════
// RECOVERY
// ════════════════════════════════════════════════════════════════════════════

/// Recover the payload a sequencer batch commits to via its DAS certificate.
///
/// `sequencer_msg` is the full batch frame: bytes `8..16` carry the
/// big-endian max timestamp, the serialized certificate starts at byte 40.
/// With `validate_seq_msg` set, the keyset public keys are point-checked as
/// untrusted input; replay paths that already verified the keyset hash
/// leave it unset.
///
/// Preimages touched along the way are recorded into `preimages` when given:
/// the keyset tree, then either the full payload tree (version 1) or the
/// flat payload plus its bridge leaf (version 0).
pub async fn recover_payload_from_das_batch(
    batch_num: u64,
    sequencer_msg: &[u8],
    das_reader: &dyn DasReader,
    keyset_fetcher: &dyn DasKeysetFetcher,
    preimages: Option<&PreimageSet>,
    validate_seq_msg: bool,
) -> Result<RecoveryOutcome, RecoveryError> {
    // Step 1: parse the certificate at the frame tail. A frame that doesn't
    // parse is simply not a DAS batch.
    if sequencer_msg.len() < CERT_OFFSET {
        error!(
            batch_num,
            len = sequencer_msg.len(),
            "sequencer message too short to carry a DAS certificate"
        );
        return Ok(RecoveryOutcome::NotADaBatch);
    }
    let cert = match DataAvailabilityCertificate::deserialize(&sequencer_msg[CERT_OFFSET..]) {
        Ok(cert) => cert,
        Err(err) => {
            error!(batch_num, error = %err, "failed to deserialize DAS certificate");
            return Ok(RecoveryOutcome::NotADaBatch);
        }
    };

    // Step 2: versions we don't know mean this node is behind, not that the
    // batch is bad.
    if cert.version >= 2 {
        error!(
            batch_num,
            version = cert.version,
            "unknown certificate version, node software is probably out of date"
        );
        return Ok(RecoveryOutcome::Rejected(RejectReason::UnsupportedVersion(
            cert.version,
        )));
    }

    // Step 3: fetch the keyset preimage. The certificate named it, so a
    // failure here is a transport fault, not a rejection.
    let keyset_preimage = keyset_fetcher
        .get_keyset_by_hash(&cert.keyset_hash)
        .await
        .map_err(|source| {
            error!(batch_num, keyset_hash = %cert.keyset_hash, error = %source, "couldn't get keyset");
            RecoveryError::KeysetFetch {
                batch_num,
                keyset_hash: cert.keyset_hash,
                source,
            }
        })?;

    // Step 4: record the keyset tree before touching its content.
    if let Some(set) = preimages {
        hash::record_tree_hash(&keyset_preimage, set);
    }

    // Step 5: point-check the committee keys only for untrusted sequencer
    // messages; replay paths already trust the keyset hash.
    let keyset = Keyset::deserialize(&keyset_preimage, validate_seq_msg).map_err(|source| {
        RecoveryError::SeqMsgValidation {
            batch_num,
            keyset_hash: cert.keyset_hash,
            source,
        }
    })?;

    // Step 6: quorum + aggregate signature over the signable fields.
    if let Err(err) = keyset.verify_signature(
        cert.signers_mask,
        &cert.serialize_signable_fields(),
        &cert.sig,
    ) {
        error!(batch_num, error = %err, "bad signature on DAS batch");
        return Ok(RecoveryOutcome::Rejected(
            RejectReason::SignatureVerification(err),
        ));
    }

    // Step 7: the certificate must outlive the batch by the minimum window.
    let max_timestamp = u64::from_be_bytes(
        sequencer_msg[MAX_TIMESTAMP_RANGE]
            .try_into()
            .expect("range is exactly 8 bytes"),
    );
    let required = max_timestamp.saturating_add(MIN_LIFETIME_SECS);
    if cert.timeout < required {
        error!(
            batch_num,
            timeout = cert.timeout,
            required,
            "data availability cert expires too soon"
        );
        return Ok(RecoveryOutcome::Rejected(RejectReason::ExpiresTooSoon {
            timeout: cert.timeout,
            required,
        }));
    }

    // Step 8: version-0 entries live under the bridged tree hash; the raw
    // flat hash stays as a legacy fallback. The fallback fires on any error,
    // not just NotFound, matching the wire-era behavior.
    let lookup_hash = if cert.version == 0 {
        hash::flat_hash_to_tree_hash(&cert.data_hash)
    } else {
        cert.data_hash
    };
    let payload = match das_reader.get_by_hash(&lookup_hash).await {
        Ok(payload) => payload,
        Err(err) if lookup_hash != cert.data_hash => {
            debug!(new = %lookup_hash, old = %cert.data_hash, error = %err, "error fetching new style hash, trying old");
            match das_reader.get_by_hash(&cert.data_hash).await {
                Ok(payload) => payload,
                Err(source) => {
                    error!(batch_num, error = %source, "couldn't fetch DAS batch contents");
                    return Err(RecoveryError::PayloadFetch {
                        batch_num,
                        data_hash: cert.data_hash,
                        source,
                    });
                }
            }
        }
        Err(source) => {
            error!(batch_num, error = %source, "couldn't fetch DAS batch contents");
            return Err(RecoveryError::PayloadFetch {
                batch_num,
                data_hash: cert.data_hash,
                source,
            });
        }
    };

    // Step 9: bind the payload to the certificate under the version's scheme.
    let hash_matches = match cert.version {
        0 => hash::keccak256(&payload) == cert.data_hash,
        _ => hash::valid_tree_hash(&cert.data_hash, &payload),
    };
    if !hash_matches {
        error!(
            batch_num,
            data_hash = %cert.data_hash,
            version = cert.version,
            "preimage mismatch for hash"
        );
        return Err(RecoveryError::HashMismatch {
            data_hash: cert.data_hash,
            version: cert.version,
        });
    }

    // Step 10: record replay preimages, bit-identical to the wire era.
    if let Some(set) = preimages {
        if cert.version == 0 {
            let tree_leaf = hash::flat_hash_to_tree_leaf(&cert.data_hash);
            set.record(cert.data_hash, &payload, PreimageType::Keccak256);
            set.record(
                hash::keccak256(&tree_leaf),
                &tree_leaf,
                PreimageType::Keccak256,
            );
        } else {
            hash::record_tree_hash(&payload, set);
        }
    }

    Ok(RecoveryOutcome::Payload(payload))
}

/// Fetch and deserialize the keyset a certificate names, verifying the
/// content address first. Set `assume_keyset_valid` on replay paths to skip
/// the per-key point checks.
pub async fn recover_keyset(
    cert: &DataAvailabilityCertificate,
    reader: &dyn DasReader,
    assume_keyset_valid: bool,
) -> Result<Keyset, RecoveryError> {
    let keyset_bytes = reader.get_by_hash(&cert.keyset_hash).await?;
    if !hash::valid_tree_hash(&cert.keyset_hash, &keyset_bytes) {
        return Err(RecoveryError::KeysetHashMismatch {
            keyset_hash: cert.keyset_hash,
        });
    }
    Keyset::deserialize(&keyset_bytes, !assume_keyset_valid).map_err(|source| {
        RecoveryError::KeysetDecode {
            keyset_hash: cert.keyset_hash,
            source,
        }
    })
}

// ════════════════════════════════════════════════════════════════════════════
// READER / WRITER ADAPTERS
// ════════════════════════════════════════════════════════════════════════════

/// Bundles a payload reader with a keyset fetcher into the shape the batch
/// ingestion layer drives.
#[derive(Debug)]
pub struct ReaderForDas<R, K> {
    das_reader: R,
    keyset_fetcher: K,
}

impl<R, K> ReaderForDas<R, K>
where
    R: DasReader,
    K: DasKeysetFetcher,
{
    pub fn new(das_reader: R, keyset_fetcher: K) -> Self {
        Self {
            das_reader,
            keyset_fetcher,
        }
    }

    /// Whether a batch header byte engages DAS recovery at all.
    #[must_use]
    pub fn is_valid_header_byte(&self, header: u8) -> bool {
        cert::is_das_message_header_byte(header)
    }

    /// See [`recover_payload_from_das_batch`].
    pub async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        sequencer_msg: &[u8],
        preimages: Option<&PreimageSet>,
        validate_seq_msg: bool,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        recover_payload_from_das_batch(
            batch_num,
            sequencer_msg,
            &self.das_reader,
            &self.keyset_fetcher,
            preimages,
            validate_seq_msg,
        )
        .await
    }
}

/// Write-path adapter: batches to the DA committee, falling back to
/// returning the message itself for on-chain posting when batching fails.
#[derive(Debug)]
pub struct WriterForDas<W> {
    writer: W,
}

impl<W: DasWriter> WriterForDas<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Store `message` with the committee and return the serialized
    /// certificate. On [`StorageError::BatchToDasFailed`] the message itself
    /// is returned so the caller can post it on chain, unless that fallback
    /// is disabled.
    pub async fn store(
        &self,
        message: &[u8],
        timeout: u64,
        disable_fallback_store_data_on_chain: bool,
    ) -> Result<Vec<u8>, StorageError> {
        match self.writer.store(message, timeout).await {
            Ok(cert) => Ok(cert.serialize()),
            Err(StorageError::BatchToDasFailed) => {
                if disable_fallback_store_data_on_chain {
                    Err(StorageError::Transport(
                        "unable to batch to DAS and fallback storing data on chain is disabled"
                            .to_string(),
                    ))
                } else {
                    warn!("falling back to storing data on chain");
                    Ok(message.to_vec())
                }
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_payload_accessor() {
        let outcome = RecoveryOutcome::Payload(vec![1, 2, 3]);
        assert_eq!(outcome.payload(), Some(vec![1, 2, 3]));
        assert_eq!(RecoveryOutcome::NotADaBatch.payload(), None);
        assert_eq!(
            RecoveryOutcome::Rejected(RejectReason::UnsupportedVersion(2)).payload(),
            None
        );
    }

    #[test]
    fn test_reject_reason_display() {
        let msg = RejectReason::UnsupportedVersion(3).to_string();
        assert!(msg.contains("version 3"));

        let msg = RejectReason::ExpiresTooSoon {
            timeout: 10,
            required: 20,
        }
        .to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_min_lifetime_is_one_week() {
        assert_eq!(MIN_LIFETIME_SECS, 604_800);
    }
}
