//! Checkpoint phases reported through the epoch table
//!
//! Each epoch table slot records the last phase its thread finished. The
//! ordering follows the checkpoint, GC and index-grow state machines of the
//! store layer:
//!
//! 1. **PrepIndexChkpt / IndexChkpt**: index checkpoint
//! 2. **Prepare / InProgress / WaitPending / WaitFlush**: hybrid log checkpoint
//! 3. **Rest**: no operation in progress
//! 4. **PersistenceCallback**: checkpoint durable, callback running
//! 5. **GcIoPending / GcInProgress**: garbage collection
//! 6. **GrowPrepare / GrowInProgress**: index growth

use std::fmt;

/// Phases of the store's cooperative state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u32)]
pub enum Phase {
    // Checkpoint phases
    /// Prepare index checkpoint - synchronize threads
    PrepIndexChkpt = 0,
    /// Index checkpoint in progress
    IndexChkpt = 1,
    /// Prepare hybrid log checkpoint
    Prepare = 2,
    /// Checkpoint in progress
    InProgress = 3,
    /// Waiting for pending operations
    WaitPending = 4,
    /// Waiting for flush to complete
    WaitFlush = 5,
    /// Rest state - no operation in progress
    #[default]
    Rest = 6,
    /// Persistence callback
    PersistenceCallback = 7,

    // Garbage collection phases
    /// GC I/O pending - finish outstanding I/Os
    GcIoPending = 8,
    /// GC in progress - cleaning hash table
    GcInProgress = 9,

    // Grow index phases
    /// Grow prepare - wait for threads to complete operations
    GrowPrepare = 10,
    /// Grow in progress - copying hash table
    GrowInProgress = 11,

    /// Invalid phase
    Invalid = 12,
}

impl Phase {
    /// Raw marker value stored in an epoch table slot
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Phase name as used in logs
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::PrepIndexChkpt => "PREP_INDEX_CHKPT",
            Phase::IndexChkpt => "INDEX_CHKPT",
            Phase::Prepare => "PREPARE",
            Phase::InProgress => "IN_PROGRESS",
            Phase::WaitPending => "WAIT_PENDING",
            Phase::WaitFlush => "WAIT_FLUSH",
            Phase::Rest => "REST",
            Phase::PersistenceCallback => "PERSISTENCE_CALLBACK",
            Phase::GcIoPending => "GC_IO_PENDING",
            Phase::GcInProgress => "GC_IN_PROGRESS",
            Phase::GrowPrepare => "GROW_PREPARE",
            Phase::GrowInProgress => "GROW_IN_PROGRESS",
            Phase::Invalid => "INVALID",
        }
    }
}

impl From<u32> for Phase {
    fn from(v: u32) -> Self {
        match v {
            0 => Phase::PrepIndexChkpt,
            1 => Phase::IndexChkpt,
            2 => Phase::Prepare,
            3 => Phase::InProgress,
            4 => Phase::WaitPending,
            5 => Phase::WaitFlush,
            6 => Phase::Rest,
            7 => Phase::PersistenceCallback,
            8 => Phase::GcIoPending,
            9 => Phase::GcInProgress,
            10 => Phase::GrowPrepare,
            11 => Phase::GrowInProgress,
            _ => Phase::Invalid,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
