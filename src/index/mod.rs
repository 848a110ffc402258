//! Hash index for FASTER
//!
//! A fixed-size table of cache-line sized buckets. Each bucket holds seven
//! tagged 64-bit entries and an overflow entry; every entry is updated with
//! single-word atomics. Records chain back to older records through the
//! 48-bit address in their [`RecordHeader`]. Probing, insertion and overflow
//! allocation belong to the store that owns the table.

mod hash_bucket;
mod hash_table;
mod hasher;
mod record;

pub use hash_bucket::{AtomicHashBucketEntry, HashBucket, HashBucketEntry};
pub use hash_table::{HashTable, HashTableBuilder};
pub use hasher::{KeyHasher, Xxh3KeyHasher};
pub use record::RecordHeader;

/// Key hash type for index operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyHash {
    hash: u64,
}

impl KeyHash {
    /// Number of bits used for the tag
    pub const TAG_BITS: u32 = HashBucketEntry::TAG_BITS;

    /// Create a new key hash
    #[inline]
    pub const fn new(hash: u64) -> Self {
        Self { hash }
    }

    /// Get the full hash value
    #[inline]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Get the hash table index for a given table size
    ///
    /// `size` must be a power of two.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `size` is not a power of two. Release builds
    /// return a meaningless index for such sizes.
    #[inline]
    pub const fn hash_table_index(&self, size: u64) -> usize {
        debug_assert!(size.is_power_of_two());
        (self.hash & size.wrapping_sub(1)) as usize
    }

    /// Get the tag portion of the hash (14 bits starting at bit 48)
    #[inline]
    pub const fn tag(&self) -> u16 {
        ((self.hash >> 48) & ((1 << Self::TAG_BITS) - 1)) as u16
    }
}

impl From<u64> for KeyHash {
    #[inline]
    fn from(hash: u64) -> Self {
        Self::new(hash)
    }
}

/// Configuration for the hash index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Size of the hash table (must be power of 2)
    pub table_size: u64,
}

impl IndexConfig {
    /// Create a new index configuration
    pub fn new(table_size: u64) -> Self {
        Self { table_size }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table_size: 1 << 20, // 1M buckets by default
        }
    }
}
