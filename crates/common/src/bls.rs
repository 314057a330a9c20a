//! BLS12-381 aggregate signature wrappers (min-pk: 48-byte public keys,
//! 96-byte signatures). The curve arithmetic itself is delegated to `blst`;
//! this module only fixes the byte encodings, the domain separation tag, and
//! the trusted/untrusted validation split used by the keyset codec.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use blst::min_pk;
use blst::BLST_ERROR;

/// Compressed public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 48;

/// Compressed signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 96;

/// Domain separation tag for the basic (non-augmented) scheme. Must be
/// identical across implementations for signatures to interoperate.
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

#[derive(Debug, Error)]
pub enum BlsError {
    #[error("invalid public key encoding: {0:?}")]
    InvalidPublicKey(BLST_ERROR),

    #[error("invalid signature encoding: {0:?}")]
    InvalidSignature(BLST_ERROR),

    #[error("invalid secret key material: {0:?}")]
    InvalidSecretKey(BLST_ERROR),

    #[error("cannot aggregate an empty set")]
    EmptyAggregate,

    #[error("aggregation failed: {0:?}")]
    AggregationFailed(BLST_ERROR),
}

/// A BLS public key (G1 point).
#[derive(Clone)]
pub struct PublicKey(min_pk::PublicKey);

impl PublicKey {
    /// Decode a compressed public key.
    ///
    /// With `validate` set, the point is fully checked (on-curve, subgroup,
    /// not infinity). Pass `validate = false` only when the bytes come from a
    /// source that was already authenticated, e.g. a keyset whose hash has
    /// been verified.
    pub fn from_bytes(bytes: &[u8], validate: bool) -> Result<Self, BlsError> {
        let pk = if validate {
            min_pk::PublicKey::key_validate(bytes)
        } else {
            min_pk::PublicKey::from_bytes(bytes)
        }
        .map_err(BlsError::InvalidPublicKey)?;
        Ok(Self(pk))
    }

    /// Compressed encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.compress()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.to_bytes()[..8]))
    }
}

/// A BLS signature (G2 point), possibly an aggregate.
#[derive(Clone)]
pub struct Signature(min_pk::Signature);

impl Signature {
    /// Decode a compressed signature. The point is always group-checked:
    /// signatures arrive inside certificates from untrusted senders.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlsError> {
        let sig = min_pk::Signature::sig_validate(bytes, true).map_err(BlsError::InvalidSignature)?;
        Ok(Self(sig))
    }

    /// Compressed encoding.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.compress()
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Signature {}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.to_bytes()[..8]))
    }
}

/// A BLS secret key. Used by the store/write path and by test fixtures;
/// the read path never holds one.
pub struct SecretKey(min_pk::SecretKey);

impl SecretKey {
    /// Generate a fresh secret key from OS randomness.
    pub fn generate() -> Result<Self, BlsError> {
        let mut ikm = [0u8; 32];
        OsRng.fill_bytes(&mut ikm);
        Self::from_ikm(&ikm)
    }

    /// Derive a secret key from input key material (at least 32 bytes).
    /// Deterministic: the same ikm always yields the same key.
    pub fn from_ikm(ikm: &[u8]) -> Result<Self, BlsError> {
        let sk = min_pk::SecretKey::key_gen(ikm, &[]).map_err(BlsError::InvalidSecretKey)?;
        Ok(Self(sk))
    }

    /// The corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk())
    }

    /// Sign a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message, DST, &[]))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "SecretKey(..)")
    }
}

/// Aggregate public keys into a single verification key.
pub fn aggregate_public_keys(keys: &[PublicKey]) -> Result<PublicKey, BlsError> {
    if keys.is_empty() {
        return Err(BlsError::EmptyAggregate);
    }
    let refs: Vec<&min_pk::PublicKey> = keys.iter().map(|k| &k.0).collect();
    let agg =
        min_pk::AggregatePublicKey::aggregate(&refs, false).map_err(BlsError::AggregationFailed)?;
    Ok(PublicKey(agg.to_public_key()))
}

/// Aggregate signatures over the same message into one.
pub fn aggregate_signatures(sigs: &[Signature]) -> Result<Signature, BlsError> {
    if sigs.is_empty() {
        return Err(BlsError::EmptyAggregate);
    }
    let refs: Vec<&min_pk::Signature> = sigs.iter().map(|s| &s.0).collect();
    let agg =
        min_pk::AggregateSignature::aggregate(&refs, false).map_err(BlsError::AggregationFailed)?;
    Ok(Signature(agg.to_signature()))
}

/// Verify `sig` over `message` against `public_key`.
///
/// Returns `Ok(false)` on a clean verification failure and `Err` when the
/// inputs are malformed points, mirroring the two distinct failure modes
/// callers must treat separately.
pub fn verify_signature(
    sig: &Signature,
    message: &[u8],
    public_key: &PublicKey,
) -> Result<bool, BlsError> {
    match sig.0.verify(true, message, DST, &[], &public_key.0, false) {
        BLST_ERROR::BLST_SUCCESS => Ok(true),
        BLST_ERROR::BLST_VERIFY_FAIL => Ok(false),
        err => Err(BlsError::InvalidSignature(err)),
    }
}
