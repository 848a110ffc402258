//! Error types for the epoch and index core
//!
//! Every variant here is a configuration error: the caller asked for a
//! layout, size or thread count the core cannot honor. None of them are
//! retried internally.

use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T, E = FasterError> = std::result::Result<T, E>;

/// Fatal errors raised while building or sizing core structures.
#[derive(Debug, thiserror::Error)]
pub enum FasterError {
    /// Aligned allocation was requested with a zero alignment or size.
    #[error("invalid aligned allocation: alignment {alignment}, size {size}")]
    InvalidAlignment {
        /// Requested alignment in bytes.
        alignment: usize,
        /// Requested usable size in bytes.
        size: usize,
    },
    /// A size that must be a power of two is not.
    #[error("{what} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// What was being sized.
        what: &'static str,
        /// Offending value.
        value: u64,
    },
    /// A hash table's bucket array does not fit in the address space.
    #[error("hash table of {buckets} buckets does not fit in the address space")]
    TableTooLarge {
        /// Requested bucket count.
        buckets: u64,
    },
    /// A hash table was built without a hash function.
    #[error("hash table requires a hash function")]
    MissingHashFunction,
    /// A packed structure does not occupy exactly one cache line.
    #[error("{type_name} is {size} bytes, expected one cache line of {expected} bytes")]
    CacheLineMismatch {
        /// Name of the offending type.
        type_name: &'static str,
        /// Actual size of the type.
        size: usize,
        /// Cache line size.
        expected: usize,
    },
    /// No free epoch table slot was found within the probe bound.
    #[error("epoch table exhausted after {probes} probes; raise the table size")]
    EpochTableExhausted {
        /// Number of probes attempted.
        probes: usize,
    },
    /// A typed view does not fit inside its aligned backing buffer.
    #[error("aligned view needs {needed} bytes but only {available} are available")]
    AlignedViewTooLarge {
        /// Bytes required by the view.
        needed: usize,
        /// Usable bytes behind the aligned start.
        available: usize,
    },
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FasterError {
    /// Whether this error belongs to the non-recoverable configuration class.
    ///
    /// Everything except a config-loading failure is fatal: the process was
    /// started with a layout or sizing it cannot run with.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, FasterError::Config(_))
    }
}
