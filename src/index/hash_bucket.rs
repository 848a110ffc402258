//! Hash bucket structures for FASTER's hash index
//!
//! This module defines the hash bucket and entry types used by the hash index
//! to map keys to their locations in the log.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Zeroable;

use crate::constants::CACHE_LINE_BYTES;

/// Entry stored in a hash bucket
///
/// Packed into 8 bytes with the following layout (low to high bits):
/// - address (48 bits): Logical address of the record
/// - tag (14 bits): Hash tag for quick comparison
/// - reserved (1 bit): Reserved for the index
/// - tentative (1 bit): Entry is being inserted
///
/// The all-zero word is the empty entry.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HashBucketEntry(u64);

impl HashBucketEntry {
    /// Invalid/empty entry value
    pub const INVALID: Self = Self(0);

    /// Number of bits for the address
    pub const ADDRESS_BITS: u32 = 48;

    /// Number of bits for the tag
    pub const TAG_BITS: u32 = 14;

    /// Largest address an entry can hold
    pub const MAX_ADDRESS: u64 = Self::ADDRESS_MASK;

    /// Largest tag an entry can hold
    pub const MAX_TAG: u16 = Self::TAG_MASK as u16;

    /// Address mask (48 bits)
    const ADDRESS_MASK: u64 = (1 << Self::ADDRESS_BITS) - 1;

    /// Tag shift position
    const TAG_SHIFT: u32 = Self::ADDRESS_BITS;

    /// Tag mask
    const TAG_MASK: u64 = (1 << Self::TAG_BITS) - 1;

    /// Reserved bit position
    const RESERVED_BIT: u64 = 1 << 62;

    /// Tentative bit position
    const TENTATIVE_BIT: u64 = 1 << 63;

    /// Create a new entry
    #[inline]
    pub const fn new(address: u64, tag: u16, tentative: bool) -> Self {
        let mut control = address & Self::ADDRESS_MASK;
        control |= ((tag as u64) & Self::TAG_MASK) << Self::TAG_SHIFT;
        if tentative {
            control |= Self::TENTATIVE_BIT;
        }
        Self(control)
    }

    /// Create an entry from raw control value
    #[inline]
    pub const fn from_control(control: u64) -> Self {
        Self(control)
    }

    /// Get the raw control value
    #[inline]
    pub const fn control(&self) -> u64 {
        self.0
    }

    /// Check if this entry is unused/invalid
    #[inline]
    pub const fn is_unused(&self) -> bool {
        self.0 == 0
    }

    /// Get the address portion
    #[inline]
    pub const fn address(&self) -> u64 {
        self.0 & Self::ADDRESS_MASK
    }

    /// Get the tag portion
    #[inline]
    pub const fn tag(&self) -> u16 {
        ((self.0 >> Self::TAG_SHIFT) & Self::TAG_MASK) as u16
    }

    /// Check if entry is tentative (being inserted)
    #[inline]
    pub const fn is_tentative(&self) -> bool {
        (self.0 & Self::TENTATIVE_BIT) != 0
    }

    /// Check the reserved bit
    #[inline]
    pub const fn is_reserved(&self) -> bool {
        (self.0 & Self::RESERVED_BIT) != 0
    }

    /// Copy of this entry with a different address
    #[inline]
    pub const fn with_address(self, address: u64) -> Self {
        Self((self.0 & !Self::ADDRESS_MASK) | (address & Self::ADDRESS_MASK))
    }

    /// Copy of this entry with a different tag
    #[inline]
    pub const fn with_tag(self, tag: u16) -> Self {
        let tag_bits = Self::TAG_MASK << Self::TAG_SHIFT;
        Self((self.0 & !tag_bits) | (((tag as u64) & Self::TAG_MASK) << Self::TAG_SHIFT))
    }

    /// Copy of this entry with the tentative bit set or cleared
    #[inline]
    pub const fn with_tentative(self, tentative: bool) -> Self {
        if tentative {
            Self(self.0 | Self::TENTATIVE_BIT)
        } else {
            Self(self.0 & !Self::TENTATIVE_BIT)
        }
    }
}

impl fmt::Debug for HashBucketEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashBucketEntry")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("tag", &self.tag())
            .field("tentative", &self.is_tentative())
            .field("reserved", &self.is_reserved())
            .finish()
    }
}

/// Atomic version of HashBucketEntry for thread-safe operations
///
/// Every accessor is a single atomic operation on the whole 64-bit word.
/// Field setters are read-modify-write loops, so updating one field never
/// overwrites a concurrent update to another.
#[repr(transparent)]
pub struct AtomicHashBucketEntry {
    control: AtomicU64,
}

impl AtomicHashBucketEntry {
    /// Create a new atomic entry
    #[inline]
    pub const fn new(entry: HashBucketEntry) -> Self {
        Self {
            control: AtomicU64::new(entry.0),
        }
    }

    /// Create a new invalid/empty entry
    #[inline]
    pub const fn invalid() -> Self {
        Self::new(HashBucketEntry::INVALID)
    }

    /// Load the entry atomically
    #[inline]
    pub fn load(&self, ordering: Ordering) -> HashBucketEntry {
        HashBucketEntry(self.control.load(ordering))
    }

    /// Store an entry atomically
    #[inline]
    pub fn store(&self, entry: HashBucketEntry, ordering: Ordering) {
        self.control.store(entry.0, ordering);
    }

    /// Compare and exchange
    #[inline]
    pub fn compare_exchange(
        &self,
        current: HashBucketEntry,
        new: HashBucketEntry,
        success: Ordering,
        failure: Ordering,
    ) -> Result<HashBucketEntry, HashBucketEntry> {
        self.control
            .compare_exchange(current.0, new.0, success, failure)
            .map(HashBucketEntry)
            .map_err(HashBucketEntry)
    }

    /// Apply `f` to the word under compare-and-swap; returns the previous entry
    #[inline]
    fn update(&self, f: impl Fn(HashBucketEntry) -> HashBucketEntry) -> HashBucketEntry {
        let previous = self
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some(f(HashBucketEntry(word)).0)
            });
        // The closure never declines, so both arms carry the previous word.
        HashBucketEntry(previous.unwrap_or_else(|word| word))
    }

    /// Get the address portion
    #[inline]
    pub fn get_address(&self) -> u64 {
        self.load(Ordering::Acquire).address()
    }

    /// Set the address, leaving tag and flag bits untouched
    #[inline]
    pub fn set_address(&self, address: u64) -> HashBucketEntry {
        debug_assert!(address <= HashBucketEntry::MAX_ADDRESS);
        self.update(|entry| entry.with_address(address))
    }

    /// Get the tag portion
    #[inline]
    pub fn get_tag(&self) -> u16 {
        self.load(Ordering::Acquire).tag()
    }

    /// Set the tag, leaving address and flag bits untouched
    #[inline]
    pub fn set_tag(&self, tag: u16) -> HashBucketEntry {
        debug_assert!(tag <= HashBucketEntry::MAX_TAG);
        self.update(|entry| entry.with_tag(tag))
    }

    /// Check if entry is tentative
    #[inline]
    pub fn is_tentative(&self) -> bool {
        self.load(Ordering::Acquire).is_tentative()
    }

    /// Mark the entry tentative
    #[inline]
    pub fn set_tentative(&self) -> HashBucketEntry {
        HashBucketEntry(
            self.control
                .fetch_or(HashBucketEntry::TENTATIVE_BIT, Ordering::AcqRel),
        )
    }

    /// Commit a tentative entry
    #[inline]
    pub fn clear_tentative(&self) -> HashBucketEntry {
        HashBucketEntry(
            self.control
                .fetch_and(!HashBucketEntry::TENTATIVE_BIT, Ordering::AcqRel),
        )
    }
}

impl Default for AtomicHashBucketEntry {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Clone for AtomicHashBucketEntry {
    fn clone(&self) -> Self {
        Self::new(self.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for AtomicHashBucketEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}

// SAFETY: a transparent wrapper around AtomicU64; zero is the empty entry.
unsafe impl Zeroable for AtomicHashBucketEntry {}

/// Hash bucket for the hash index
///
/// Contains 7 entries plus one overflow entry, fitting in a cache line (64 bytes).
#[repr(C, align(64))]
pub struct HashBucket {
    /// Hash bucket entries
    pub entries: [AtomicHashBucketEntry; Self::NUM_ENTRIES],
    /// Overflow entry, chaining to storage managed by the caller
    pub overflow_entry: AtomicHashBucketEntry,
}

impl HashBucket {
    /// Number of entries per bucket (excluding overflow)
    pub const NUM_ENTRIES: usize = 7;

    /// Create a new empty hash bucket
    pub const fn new() -> Self {
        Self {
            entries: [
                AtomicHashBucketEntry::invalid(),
                AtomicHashBucketEntry::invalid(),
                AtomicHashBucketEntry::invalid(),
                AtomicHashBucketEntry::invalid(),
                AtomicHashBucketEntry::invalid(),
                AtomicHashBucketEntry::invalid(),
                AtomicHashBucketEntry::invalid(),
            ],
            overflow_entry: AtomicHashBucketEntry::invalid(),
        }
    }

    /// Check whether every entry, overflow included, is empty
    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .chain(std::iter::once(&self.overflow_entry))
            .all(|e| e.load(Ordering::Acquire).is_unused())
    }
}

impl Default for HashBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HashBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashBucket")
            .field("entries", &self.entries)
            .field("overflow", &self.overflow_entry)
            .finish()
    }
}

// SAFETY: only atomic entries, all valid when zeroed.
unsafe impl Zeroable for HashBucket {}

// Ensure HashBucket fits in a cache line
const _: () = assert!(mem::size_of::<HashBucket>() == CACHE_LINE_BYTES);
