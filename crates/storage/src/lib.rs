//! # DAS Storage Crate
//!
//! Storage services for the DAS subsystem and the batch recovery pipeline
//! that drives them.
//!
//! ## Modules
//! - `traits`: the `StorageService` contract and `ExpirationPolicy`
//! - `error`: `StorageError`, including the cross-boundary sentinels
//! - `memory`: in-memory backend
//! - `localfs`: content-addressed filesystem backend
//! - `redis`: HMAC-signed write-through Redis cache over a base service
//! - `recovery`: certificate-driven payload recovery and the write path
//!
//! ## Layering
//! ```text
//! ┌─────────────────────┐
//! │   StorageService    │  <- closed capability set
//! └─────────┬───────────┘
//!           │
//!    ┌──────┼────────────────┐
//!    │      │                │
//! ┌──▼───┐ ┌▼─────────┐ ┌────▼───────────────┐
//! │Memory│ │ LocalFs  │ │ RedisStorageService│ ── owns ──► base service
//! └──────┘ └──────────┘ └────────────────────┘
//! ```

pub mod error;
pub mod localfs;
pub mod memory;
pub mod recovery;
pub mod redis;
pub mod traits;

pub use error::StorageError;
pub use localfs::LocalFsStorage;
pub use memory::MemoryStorage;
pub use recovery::{
    recover_keyset, recover_payload_from_das_batch, DasKeysetFetcher, DasWriter, ReaderForDas,
    RecoveryError, RecoveryOutcome, RejectReason, WriterForDas, MIN_LIFETIME_SECS,
};
pub use self::redis::{RedisConfig, RedisStorageService};
pub use traits::{DasReader, ExpirationPolicy, StorageService};
