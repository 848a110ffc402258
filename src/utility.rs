//! Utility functions and aligned allocation
//!
//! The epoch table and the hash bucket array both live in memory whose start
//! address is a multiple of the cache line size. [`aligned_alloc`] produces
//! such a region from an over-sized, zeroed backing buffer, and
//! [`AlignedSlice`] lays a typed, bounds-checked view over it.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bytemuck::Zeroable;

use crate::error::{FasterError, Result};

/// Check if a value is a power of two
#[inline]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// An owned, zeroed backing buffer plus the aligned start offset inside it.
///
/// The backing buffer is `size + alignment - 1` bytes long, so at least
/// `size` usable bytes follow the aligned start. Dropping the allocation
/// frees the whole backing buffer.
pub struct AlignedAlloc {
    origin: NonNull<[u8]>,
    start: usize,
    size: usize,
    alignment: usize,
}

/// Allocate `size` usable bytes starting at a multiple of `alignment`.
///
/// Zero alignment or zero size is a caller contract violation and returns
/// [`FasterError::InvalidAlignment`].
pub fn aligned_alloc(alignment: usize, size: usize) -> Result<AlignedAlloc> {
    let invalid = || FasterError::InvalidAlignment { alignment, size };
    if alignment == 0 || size == 0 {
        return Err(invalid());
    }
    let backing_len = size.checked_add(alignment - 1).ok_or_else(invalid)?;

    let backing: Box<[u8]> = vec![0u8; backing_len].into_boxed_slice();
    let origin = NonNull::from(Box::leak(backing));

    let origin_addr = origin.as_ptr() as *mut u8 as usize;
    let misalignment = origin_addr % alignment;
    let start = if misalignment == 0 {
        0
    } else {
        alignment - misalignment
    };
    debug_assert!(start + size <= backing_len);

    Ok(AlignedAlloc {
        origin,
        start,
        size,
        alignment,
    })
}

impl AlignedAlloc {
    /// Pointer to the aligned start of the usable region
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: `start + size <= backing_len`, so the offset stays in bounds.
        unsafe { (self.origin.as_ptr() as *mut u8).add(self.start) }
    }

    /// Offset of the aligned start from the beginning of the backing buffer
    #[inline]
    pub fn start_offset(&self) -> usize {
        self.start
    }

    /// Address of the first byte of the backing buffer
    #[inline]
    pub fn origin_addr(&self) -> usize {
        self.origin.as_ptr() as *mut u8 as usize
    }

    /// Length of the backing buffer in bytes
    #[inline]
    pub fn origin_len(&self) -> usize {
        self.origin.len()
    }

    /// Number of usable bytes after the aligned start
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment the start address honors
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }
}

impl Drop for AlignedAlloc {
    fn drop(&mut self) {
        // SAFETY: `origin` came from `Box::leak` in `aligned_alloc` and is
        // released exactly once.
        unsafe {
            drop(Box::from_raw(self.origin.as_ptr()));
        }
    }
}

impl fmt::Debug for AlignedAlloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedAlloc")
            .field("origin", &format_args!("{:#x}", self.origin_addr()))
            .field("start", &self.start)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .finish()
    }
}

// Safety: AlignedAlloc uniquely owns its backing buffer
unsafe impl Send for AlignedAlloc {}
unsafe impl Sync for AlignedAlloc {}

/// A fixed-length array of `T` stored in an aligned allocation.
///
/// `T` must be valid when all-zero, since the backing buffer is zeroed and
/// no per-element initialization runs.
#[derive(Debug)]
pub struct AlignedSlice<T> {
    alloc: AlignedAlloc,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Zeroable> AlignedSlice<T> {
    /// Allocate `len` zeroed elements starting at a multiple of `alignment`.
    pub fn zeroed(len: usize, alignment: usize) -> Result<Self> {
        if alignment == 0 || alignment % mem::align_of::<T>() != 0 {
            return Err(FasterError::InvalidAlignment {
                alignment,
                size: mem::size_of::<T>(),
            });
        }
        let bytes = len
            .checked_mul(mem::size_of::<T>())
            .ok_or(FasterError::InvalidAlignment {
                alignment,
                size: usize::MAX,
            })?;
        let alloc = aligned_alloc(alignment, bytes)?;
        Self::from_alloc(alloc, len)
    }

    /// Take ownership of `alloc` and view its usable region as `len` elements.
    pub fn from_alloc(alloc: AlignedAlloc, len: usize) -> Result<Self> {
        let needed = len.saturating_mul(mem::size_of::<T>());
        if needed > alloc.size() {
            return Err(FasterError::AlignedViewTooLarge {
                needed,
                available: alloc.size(),
            });
        }
        if alloc.as_ptr() as usize % mem::align_of::<T>() != 0 {
            return Err(FasterError::InvalidAlignment {
                alignment: alloc.alignment(),
                size: alloc.size(),
            });
        }
        Ok(Self {
            alloc,
            len,
            _marker: PhantomData,
        })
    }
}

impl<T> AlignedSlice<T> {
    /// The underlying allocation
    #[inline]
    pub fn allocation(&self) -> &AlignedAlloc {
        &self.alloc
    }
}

impl<T> Deref for AlignedSlice<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: the region is aligned for `T`, holds `len` elements and was
        // zero-initialized, which `T: Zeroable` makes a valid value.
        unsafe { std::slice::from_raw_parts(self.alloc.as_ptr() as *const T, self.len) }
    }
}

impl<T> DerefMut for AlignedSlice<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`; `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.alloc.as_ptr() as *mut T, self.len) }
    }
}

impl<T> Drop for AlignedSlice<T> {
    fn drop(&mut self) {
        if mem::needs_drop::<T>() {
            // SAFETY: every element is initialized and dropped exactly once;
            // the backing buffer is freed afterwards by `AlignedAlloc`.
            unsafe {
                std::ptr::drop_in_place(self.deref_mut() as *mut [T]);
            }
        }
    }
}

// Safety: AlignedSlice owns its elements like a Box<[T]>
unsafe impl<T: Send> Send for AlignedSlice<T> {}
unsafe impl<T: Sync> Sync for AlignedSlice<T> {}
