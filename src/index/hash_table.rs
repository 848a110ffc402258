//! Hash table implementation for FASTER
//!
//! A fixed, power-of-two array of cache-line sized [`HashBucket`]s. The
//! array is allocated zeroed and cache aligned; an all-zero bucket is empty,
//! so no per-bucket initialization runs. The table is never resized here;
//! a layer that grows the index swaps in a new table and retires the old one
//! through the epoch framework.

use std::fmt;

use crate::constants::CACHE_LINE_BYTES;
use crate::error::{FasterError, Result};
use crate::index::hasher::{KeyHasher, Xxh3KeyHasher};
use crate::index::{HashBucket, IndexConfig, KeyHash};
use crate::utility::{is_power_of_two, AlignedSlice};

/// Hash table - a sized array of HashBuckets addressed by key hash
pub struct HashTable<H = Xxh3KeyHasher> {
    /// Cache-aligned bucket array
    buckets: AlignedSlice<HashBucket>,
    /// Number of buckets
    size: u64,
    /// Key hash function
    hasher: H,
}

impl HashTable<Xxh3KeyHasher> {
    /// Start building a table that hashes keys with XXH3
    pub fn builder() -> HashTableBuilder<Xxh3KeyHasher> {
        HashTableBuilder {
            size: IndexConfig::default().table_size,
            hasher: Some(Xxh3KeyHasher),
        }
    }

    /// Create a table of `size` buckets hashing keys with XXH3
    pub fn new(size: u64) -> Result<Self> {
        Self::with_hasher(size, Xxh3KeyHasher)
    }
}

impl<H: KeyHasher> HashTable<H> {
    /// Create a table of `size` buckets using `hasher`
    ///
    /// Fails if `size` is not a power of two or the bucket layout does not
    /// match the cache line size.
    pub fn with_hasher(size: u64, hasher: H) -> Result<Self> {
        crate::check_cache_line_layout::<HashBucket>()?;
        if !is_power_of_two(size) {
            return Err(FasterError::NotPowerOfTwo {
                what: "hash table size",
                value: size,
            });
        }
        let too_large = || FasterError::TableTooLarge { buckets: size };
        let len = usize::try_from(size).map_err(|_| too_large())?;
        let bytes = len
            .checked_mul(std::mem::size_of::<HashBucket>())
            .ok_or_else(too_large)?;

        let buckets = AlignedSlice::<HashBucket>::zeroed(len, CACHE_LINE_BYTES)?;
        tracing::debug!(buckets = size, bytes, "allocated hash table");

        Ok(Self {
            buckets,
            size,
            hasher,
        })
    }

    /// Get the number of buckets
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hash function used for addressing
    #[inline]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Hash `key` with the table's hash function
    #[inline]
    pub fn hash_key(&self, key: &[u8]) -> KeyHash {
        KeyHash::new(self.hasher.hash64(key))
    }

    /// Index of the bucket `key` maps to: `hash(key) & (size - 1)`
    #[inline]
    pub fn bucket_index(&self, key: &[u8]) -> usize {
        self.hash_key(key).hash_table_index(self.size)
    }

    /// Get the bucket for `key`
    #[inline]
    pub fn get_bucket(&self, key: &[u8]) -> &HashBucket {
        self.bucket_for_hash(self.hash_key(key))
    }

    /// Get the bucket for a precomputed hash
    #[inline]
    pub fn bucket_for_hash(&self, hash: KeyHash) -> &HashBucket {
        &self.buckets[hash.hash_table_index(self.size)]
    }

    /// Get the bucket at a specific index
    ///
    /// # Panics
    /// Panics if `index >= size`.
    #[inline]
    pub fn bucket_at(&self, index: usize) -> &HashBucket {
        &self.buckets[index]
    }

    /// The whole bucket array
    #[inline]
    pub fn buckets(&self) -> &[HashBucket] {
        &self.buckets
    }
}

impl<H> fmt::Debug for HashTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("size", &self.size)
            .field("hasher", &std::any::type_name::<H>())
            .finish()
    }
}

/// Builder for [`HashTable`]
///
/// A builder without a hash function fails with
/// [`FasterError::MissingHashFunction`].
pub struct HashTableBuilder<H> {
    size: u64,
    hasher: Option<H>,
}

impl<H: KeyHasher> HashTableBuilder<H> {
    /// Builder with the default size and no hash function
    pub fn new() -> Self {
        Self {
            size: IndexConfig::default().table_size,
            hasher: None,
        }
    }

    /// Set the number of buckets (must be a power of two)
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Take the bucket count from an index configuration
    pub fn config(mut self, config: &IndexConfig) -> Self {
        self.size = config.table_size;
        self
    }

    /// Set the hash function
    pub fn hasher<H2: KeyHasher>(self, hasher: H2) -> HashTableBuilder<H2> {
        HashTableBuilder {
            size: self.size,
            hasher: Some(hasher),
        }
    }

    /// Allocate the table
    pub fn build(self) -> Result<HashTable<H>> {
        let hasher = self.hasher.ok_or(FasterError::MissingHashFunction)?;
        HashTable::with_hasher(self.size, hasher)
    }
}

impl<H: KeyHasher> Default for HashTableBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn identity(key: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        let n = key.len().min(8);
        bytes[..n].copy_from_slice(&key[..n]);
        u64::from_le_bytes(bytes)
    }

    #[test]
    fn test_hash_table_new() {
        let table = HashTable::new(1024).unwrap();
        assert_eq!(table.size(), 1024);
        assert_eq!(table.buckets().len(), 1024);
        assert_eq!(table.buckets().as_ptr() as usize % CACHE_LINE_BYTES, 0);
        assert!(table.buckets().iter().all(|b| b.is_empty()));
    }

    #[test]
    fn test_hash_table_non_power_of_two() {
        let err = HashTable::new(1000).unwrap_err();
        assert!(matches!(
            err,
            FasterError::NotPowerOfTwo { value: 1000, .. }
        ));
        assert!(HashTable::new(0).is_err());
    }

    #[test]
    fn test_hash_table_too_large() {
        // A power of two whose bucket array overflows the address space.
        let size = 1u64 << 60;
        let err = HashTable::new(size).unwrap_err();
        assert!(matches!(err, FasterError::TableTooLarge { buckets } if buckets == size));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_builder_without_hasher() {
        let err = HashTableBuilder::<fn(&[u8]) -> u64>::new()
            .size(8)
            .build()
            .unwrap_err();
        assert!(matches!(err, FasterError::MissingHashFunction));
    }

    #[test]
    fn test_builder_config() {
        let table = HashTable::builder()
            .config(&IndexConfig::new(16))
            .build()
            .unwrap();
        assert_eq!(table.size(), 16);
    }

    #[test]
    fn test_bucket_addressing() {
        let table = HashTable::with_hasher(16, identity).unwrap();

        assert_eq!(table.bucket_index(&[3]), 3);
        assert_eq!(table.bucket_index(&[19]), 3);
        assert!(std::ptr::eq(table.get_bucket(&[3]), table.get_bucket(&[19])));
        assert!(std::ptr::eq(table.get_bucket(&[3]), table.bucket_at(3)));
        assert!(!std::ptr::eq(table.get_bucket(&[3]), table.get_bucket(&[4])));
    }

    #[test]
    fn test_bucket_entries_are_shared() {
        let table = HashTable::with_hasher(8, identity).unwrap();
        table.get_bucket(&[5]).entries[2].set_address(99);

        let entry = table.bucket_at(5).entries[2].load(Ordering::Acquire);
        assert_eq!(entry.address(), 99);
    }
}
