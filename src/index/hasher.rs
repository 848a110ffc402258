//! Key hashing for bucket addressing
//!
//! The hash must be deterministic across runs, since bucket positions and tags
//! derive from it. We do not use `DefaultHasher`.

/// 64-bit hash over raw key bytes
pub trait KeyHasher: Send + Sync {
    /// Hash `key` into a 64-bit value
    fn hash64(&self, key: &[u8]) -> u64;
}

impl<F> KeyHasher for F
where
    F: Fn(&[u8]) -> u64 + Send + Sync,
{
    #[inline]
    fn hash64(&self, key: &[u8]) -> u64 {
        self(key)
    }
}

/// XXH3 hasher, the default for [`HashTable`](super::HashTable)
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3KeyHasher;

impl KeyHasher for Xxh3KeyHasher {
    #[inline]
    fn hash64(&self, key: &[u8]) -> u64 {
        xxhash_rust::xxh3::xxh3_64(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xxh3_is_deterministic() {
        let hasher = Xxh3KeyHasher;
        assert_eq!(hasher.hash64(b"tinykv"), hasher.hash64(b"tinykv"));
        assert_ne!(hasher.hash64(b"tinykv"), hasher.hash64(b"tinykw"));
        assert_eq!(hasher.hash64(b""), xxhash_rust::xxh3::xxh3_64(b""));
    }

    #[test]
    fn test_closure_hasher() {
        let hasher = |key: &[u8]| key.len() as u64;
        assert_eq!(hasher.hash64(b"abcd"), 4);
    }
}
