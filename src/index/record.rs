//! Record header word
//!
//! Records in the log start with a 64-bit header whose low 48 bits hold the
//! address of the previous record in the same hash chain. The upper 16 bits
//! are left to the owner of the log; this type never changes them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Zeroable;

use crate::index::HashBucketEntry;

/// Atomic record header: `| 16 bits owner-defined | 48-bit previous address |`
///
/// The address uses the same 48-bit width as [`HashBucketEntry`], so a bucket
/// entry's address can be copied into a header and followed back unchanged.
#[repr(transparent)]
#[derive(Default)]
pub struct RecordHeader {
    control: AtomicU64,
}

impl RecordHeader {
    const ADDRESS_MASK: u64 = HashBucketEntry::MAX_ADDRESS;

    /// Create a header pointing at `previous_address`
    #[inline]
    pub const fn new(previous_address: u64) -> Self {
        Self {
            control: AtomicU64::new(previous_address & Self::ADDRESS_MASK),
        }
    }

    /// Create a header from a raw 64-bit word
    #[inline]
    pub const fn from_control(control: u64) -> Self {
        Self {
            control: AtomicU64::new(control),
        }
    }

    /// Load the raw word
    #[inline]
    pub fn control(&self) -> u64 {
        self.control.load(Ordering::Acquire)
    }

    /// Load the previous-record address
    #[inline]
    pub fn load_address(&self) -> u64 {
        self.control.load(Ordering::Acquire) & Self::ADDRESS_MASK
    }

    /// Replace the previous-record address; the upper 16 bits are preserved.
    /// Returns the address it replaced.
    #[inline]
    pub fn set_address(&self, address: u64) -> u64 {
        debug_assert!(address <= Self::ADDRESS_MASK);
        let previous = self
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some((word & !Self::ADDRESS_MASK) | (address & Self::ADDRESS_MASK))
            });
        previous.unwrap_or_else(|word| word) & Self::ADDRESS_MASK
    }

    /// Swing the address from `current` to `new` if nobody moved it first.
    /// On failure returns the address that was found.
    #[inline]
    pub fn compare_exchange_address(&self, current: u64, new: u64) -> Result<u64, u64> {
        debug_assert!(new <= Self::ADDRESS_MASK);
        let mut word = self.control.load(Ordering::Acquire);
        loop {
            if word & Self::ADDRESS_MASK != current {
                return Err(word & Self::ADDRESS_MASK);
            }
            let desired = (word & !Self::ADDRESS_MASK) | (new & Self::ADDRESS_MASK);
            match self.control.compare_exchange_weak(
                word,
                desired,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => word = actual,
            }
        }
    }
}

impl fmt::Debug for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.control.load(Ordering::Relaxed);
        f.debug_struct("RecordHeader")
            .field("address", &format_args!("{:#x}", word & Self::ADDRESS_MASK))
            .field("high", &format_args!("{:#x}", word >> HashBucketEntry::ADDRESS_BITS))
            .finish()
    }
}

// SAFETY: a transparent wrapper around AtomicU64; zero is a header with no
// previous record.
unsafe impl Zeroable for RecordHeader {}
