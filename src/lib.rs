//! tinykv-faster - epoch protection and hash index core for TinyKV
//!
//! This crate carries the concurrency core that the TinyKV storage engine
//! builds on, following the FASTER design:
//! - **LightEpoch**: epoch protection, deferred reclamation actions and the
//!   checkpoint phase barrier
//! - **HashTable**: a power-of-two array of cache-line sized buckets holding
//!   tagged 64-bit entries
//! - **Aligned allocation**: cache-line aligned, zeroed storage for both
//!
//! # Quick Start
//!
//! ```rust
//! use tinykv_faster::epoch::{EpochGuard, LightEpoch};
//! use tinykv_faster::index::HashTable;
//!
//! let epoch = LightEpoch::new()?;
//! let table = HashTable::builder().size(1024).build()?;
//!
//! let slot = epoch.reserve_entry()?;
//! {
//!     let _guard = EpochGuard::new(&epoch, slot);
//!     let bucket = table.get_bucket(b"hello");
//!     bucket.entries[0].set_address(42);
//! }
//! epoch.release_entry(slot);
//! # Ok::<(), tinykv_faster::FasterError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod epoch;
pub mod error;
pub mod index;
pub mod status;
pub mod utility;

// Re-exports for convenience
pub use config::{ConfigError, FasterConfig};
pub use error::{FasterError, Result};
pub use status::Status;

/// Constants used throughout the library
pub mod constants {
    /// Size of a cache line in bytes
    pub const CACHE_LINE_BYTES: usize = 64;

    /// Default number of usable epoch table slots
    pub const MAX_THREADS: usize = 64;

    /// Number of deferred actions the drain list can hold
    pub const DRAIN_LIST_SIZE: usize = 256;
}

/// Check that `T` occupies exactly one cache line.
///
/// The epoch table and the bucket array rely on this to keep concurrently
/// written slots off each other's cache lines.
pub fn check_cache_line_layout<T>() -> Result<()> {
    let size = std::mem::size_of::<T>();
    if size != constants::CACHE_LINE_BYTES {
        return Err(FasterError::CacheLineMismatch {
            type_name: std::any::type_name::<T>(),
            size,
            expected: constants::CACHE_LINE_BYTES,
        });
    }
    Ok(())
}

/// Run every startup layout check.
///
/// Constructors call this before first use; it is exposed so embedding code
/// can fail fast during its own initialization.
pub fn verify_layout() -> Result<()> {
    epoch::verify_layout()?;
    check_cache_line_layout::<index::HashBucket>()
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::epoch::{EpochGuard, LightEpoch, Phase};
    pub use crate::error::{FasterError, Result};
    pub use crate::index::{AtomicHashBucketEntry, HashBucket, HashBucketEntry, HashTable, KeyHash};
    pub use crate::status::Status;
}
