//! # DAS Common Crate
//!
//! Pure data and crypto layer for the DAS subsystem: content hashing,
//! BLS keysets, DA certificates, and preimage recording. No I/O lives here.
//!
//! ## Modules
//! - `hash`: flat Keccak-256 and the 64 KiB binned tree hash
//! - `bls`: BLS12-381 aggregate signature wrappers
//! - `keyset`: committee descriptor codec + quorum signature verification
//! - `cert`: DA certificate wire codec and signable fields
//! - `preimage`: `(hash, bytes, type)` recording for replay verifiers
//!
//! ## Certificate Verification Flow
//! ```text
//! batch bytes ──► cert::deserialize ──► keyset fetch (by keyset_hash)
//!                                             │
//!                                             ▼
//!                  keyset::verify_signature(mask, signable fields, sig)
//!                                             │
//!                                             ▼
//!                  payload fetch ──► hash::valid_tree_hash / keccak256
//! ```

pub mod bls;
pub mod cert;
pub mod hash;
pub mod keyset;
pub mod preimage;

pub use cert::{CertError, DataAvailabilityCertificate};
pub use hash::{keccak256, tree_hash, valid_tree_hash, Hash, BIN_SIZE};
pub use keyset::{Keyset, KeysetError, MAX_KEYSET_KEYS};
pub use preimage::{PreimageSet, PreimageType};
