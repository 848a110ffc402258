//! LightEpoch - Lightweight epoch-based memory reclamation
//!
//! This module implements the epoch protection mechanism used by FASTER
//! to safely reclaim memory in lock-free data structures.
//!
//! Worker threads reserve a slot in the epoch table once, then bracket every
//! access to protected state with [`LightEpoch::protect`] and
//! [`LightEpoch::unprotect`]. Anything retired at epoch `E` may be freed once
//! the safe-to-reclaim epoch reaches `E`; deferred frees are registered with
//! [`LightEpoch::bump_current_epoch_with_action`] and run by the drain pass.

use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use bytemuck::Zeroable;
use rand::Rng;

use crate::constants::{CACHE_LINE_BYTES, DRAIN_LIST_SIZE, MAX_THREADS};
use crate::epoch::action::{EpochAction, EpochCallback};
use crate::epoch::phase::Phase;
use crate::error::{FasterError, Result};
use crate::utility::AlignedSlice;

/// Special epoch value indicating the thread is not protected
pub const UNPROTECTED: u64 = 0;

/// Slot index that never refers to a thread
pub const INVALID_SLOT: usize = 0;

/// Entry in the epoch table (one per thread)
#[repr(C, align(64))]
struct Entry {
    /// Local epoch value seen by this thread
    local_current_epoch: AtomicU64,
    /// Reentrant protection counter
    reentrant: AtomicU32,
    /// Last checkpoint phase this thread finished
    phase_finished: AtomicU32,
    /// Slot is owned by a thread
    in_use: AtomicBool,
    /// Padding to fill cache line
    _padding: [u8; CACHE_LINE_BYTES - 17],
}

// SAFETY: every field is an atomic or a byte array, all valid when zeroed.
unsafe impl Zeroable for Entry {}

impl Entry {
    fn reset(&self) {
        self.local_current_epoch.store(UNPROTECTED, Ordering::Release);
        self.reentrant.store(0, Ordering::Release);
        self.phase_finished.store(Phase::Rest.as_u32(), Ordering::Release);
    }
}

/// Check the epoch table entry layout.
pub(crate) fn verify_layout() -> Result<()> {
    crate::check_cache_line_layout::<Entry>()
}

/// Tuning for [`LightEpoch`]
#[derive(Debug, Clone)]
pub struct EpochConfig {
    /// Number of usable epoch table slots (the thread capacity)
    pub table_size: usize,
    /// Full drain-list passes without a free slot before warning and backing off
    pub saturation_passes: u32,
    /// Sleep taken after each saturation warning
    pub saturation_backoff: Duration,
}

impl EpochConfig {
    /// Create a configuration with the given thread capacity
    pub fn new(table_size: usize) -> Self {
        Self {
            table_size,
            ..Self::default()
        }
    }
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            table_size: MAX_THREADS,
            saturation_passes: 500,
            saturation_backoff: Duration::from_secs(1),
        }
    }
}

/// Lightweight epoch protection framework
///
/// Provides safe memory reclamation for lock-free data structures by tracking
/// which threads are accessing shared data and deferring cleanup until all
/// threads have moved past a safe point.
///
/// The table holds `table_size + 2` cache-line entries; slot 0 is never
/// handed out, so usable slots are `1..=table_size`.
pub struct LightEpoch {
    /// Per-thread epoch table
    table: AlignedSlice<Entry>,
    /// Number of usable slots
    table_size: usize,
    /// List of deferred actions
    drain_list: Box<[EpochAction]>,
    /// Upper bound on the number of pending drain actions
    drain_count: AtomicU32,
    /// Current global epoch
    current_epoch: AtomicU64,
    /// Cached safe-to-reclaim epoch
    safe_to_reclaim_epoch: AtomicU64,
    saturation_passes: u32,
    saturation_backoff: Duration,
}

impl LightEpoch {
    /// Create a new LightEpoch instance with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(EpochConfig::default())
    }

    /// Create a new LightEpoch instance
    ///
    /// Fails if the entry layout does not match the cache line size.
    pub fn with_config(config: EpochConfig) -> Result<Self> {
        verify_layout()?;

        let table = AlignedSlice::<Entry>::zeroed(config.table_size + 2, CACHE_LINE_BYTES)?;
        for entry in table.iter() {
            entry.reset();
        }

        let drain_list: Box<[EpochAction]> =
            (0..DRAIN_LIST_SIZE).map(|_| EpochAction::new()).collect();

        Ok(Self {
            table,
            table_size: config.table_size,
            drain_list,
            drain_count: AtomicU32::new(0),
            current_epoch: AtomicU64::new(1),
            safe_to_reclaim_epoch: AtomicU64::new(0),
            saturation_passes: config.saturation_passes.max(1),
            saturation_backoff: config.saturation_backoff,
        })
    }

    #[inline]
    fn entry(&self, slot: usize) -> &Entry {
        debug_assert!(
            slot != INVALID_SLOT && slot <= self.table_size,
            "epoch slot {slot} out of range 1..={}",
            self.table_size
        );
        &self.table[slot]
    }

    // ============ Slot reservation ============

    /// Reserve a free epoch table slot for the calling thread.
    ///
    /// Probing starts at a random slot so threads arriving together do not
    /// convoy on the same entries. Fails after `3 * table_size` probes, which
    /// means the table is too small for the number of threads.
    pub fn reserve_entry(&self) -> Result<usize> {
        let probes = 3 * self.table_size;
        if self.table_size > 0 {
            let start = rand::thread_rng().gen_range(0..self.table_size);
            for i in 0..probes {
                let slot = 1 + (start + i) % self.table_size;
                let entry = &self.table[slot];
                if entry.in_use.load(Ordering::Relaxed) {
                    continue;
                }
                if entry
                    .in_use
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    tracing::debug!(slot, "reserved epoch table slot");
                    return Ok(slot);
                }
            }
        }

        tracing::error!(
            table_size = self.table_size,
            probes,
            "epoch table exhausted"
        );
        Err(FasterError::EpochTableExhausted { probes })
    }

    /// Return a slot to the table.
    ///
    /// Only the owning thread may call this, and only while unprotected.
    pub fn release_entry(&self, slot: usize) {
        let entry = self.entry(slot);
        debug_assert!(
            entry.local_current_epoch.load(Ordering::Acquire) == UNPROTECTED,
            "releasing protected epoch slot {slot}"
        );
        entry.reset();
        entry.in_use.store(false, Ordering::Release);
        tracing::debug!(slot, "released epoch table slot");
    }

    // ============ Protection ============

    /// Enter the protected region
    ///
    /// Returns the current epoch value.
    /// The thread should call `unprotect()` when done accessing shared data.
    #[inline]
    pub fn protect(&self, slot: usize) -> u64 {
        let entry = self.entry(slot);
        let epoch = self.current_epoch.load(Ordering::SeqCst);
        entry.local_current_epoch.store(epoch, Ordering::SeqCst);
        epoch
    }

    /// Enter the protected region and drain pending actions
    #[inline]
    pub fn protect_and_drain(&self, slot: usize) -> u64 {
        let epoch = self.protect(slot);
        if self.drain_count.load(Ordering::Acquire) > 0 {
            self.drain(epoch);
        }
        epoch
    }

    /// Reentrant protection - supports nested protection calls
    ///
    /// Only the outermost call publishes a new local epoch.
    #[inline]
    pub fn reentrant_protect(&self, slot: usize) -> u64 {
        let entry = self.entry(slot);

        if entry.reentrant.fetch_add(1, Ordering::AcqRel) == 0 {
            let epoch = self.current_epoch.load(Ordering::SeqCst);
            entry.local_current_epoch.store(epoch, Ordering::SeqCst);
            epoch
        } else {
            entry.local_current_epoch.load(Ordering::Acquire)
        }
    }

    /// Reentrant protection that also drains pending actions
    #[inline]
    pub fn reentrant_protect_and_drain(&self, slot: usize) -> u64 {
        let epoch = self.reentrant_protect(slot);
        if self.drain_count.load(Ordering::Acquire) > 0 {
            self.drain(epoch);
        }
        epoch
    }

    /// Check if the thread is currently protected
    #[inline]
    pub fn is_protected(&self, slot: usize) -> bool {
        self.entry(slot)
            .local_current_epoch
            .load(Ordering::Acquire)
            != UNPROTECTED
    }

    /// Exit the protected region
    #[inline]
    pub fn unprotect(&self, slot: usize) {
        self.entry(slot)
            .local_current_epoch
            .store(UNPROTECTED, Ordering::SeqCst);
    }

    /// Exit reentrant protection
    ///
    /// The epoch is cleared only when the outermost level exits.
    #[inline]
    pub fn reentrant_unprotect(&self, slot: usize) {
        let entry = self.entry(slot);
        let depth = entry.reentrant.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(depth > 0, "unbalanced reentrant_unprotect on slot {slot}");
        if depth == 1 {
            entry
                .local_current_epoch
                .store(UNPROTECTED, Ordering::SeqCst);
        }
    }

    // ============ Epoch advancement ============

    /// Current global epoch
    #[inline]
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Acquire)
    }

    /// Cached safe-to-reclaim epoch from the last scan
    #[inline]
    pub fn safe_to_reclaim_epoch(&self) -> u64 {
        self.safe_to_reclaim_epoch.load(Ordering::Acquire)
    }

    /// Upper bound on the number of actions waiting in the drain list
    #[inline]
    pub fn pending_actions(&self) -> u32 {
        self.drain_count.load(Ordering::Acquire)
    }

    /// Number of usable epoch table slots
    #[inline]
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Number of slots in the drain list
    #[inline]
    pub fn drain_list_capacity(&self) -> usize {
        self.drain_list.len()
    }

    /// Increment the current epoch
    ///
    /// Drains pending actions if there are any.
    pub fn bump_current_epoch(&self) -> u64 {
        let next_epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if self.drain_count.load(Ordering::Acquire) > 0 {
            self.drain(next_epoch);
        }
        next_epoch
    }

    /// Increment the epoch and register a callback for when the old epoch is safe
    ///
    /// Returns the new epoch. If the drain list has no free or already-safe
    /// slot, registration keeps retrying; every `saturation_passes` full
    /// passes it logs a warning and sleeps for `saturation_backoff`.
    pub fn bump_current_epoch_with_action<F>(&self, callback: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        self.register_action(Box::new(callback))
    }

    /// Like [`bump_current_epoch_with_action`](Self::bump_current_epoch_with_action),
    /// passing `context` to `callback` when it fires.
    pub fn bump_current_epoch_with_context<C, F>(&self, callback: F, context: C) -> u64
    where
        C: Send + 'static,
        F: FnOnce(C) + Send + 'static,
    {
        self.register_action(Box::new(move || callback(context)))
    }

    fn register_action(&self, callback: EpochCallback) -> u64 {
        let prior_epoch = self.bump_current_epoch() - 1;

        let mut callback = callback;
        let mut i = 0;
        let mut passes = 0u32;
        loop {
            let slot = &self.drain_list[i];
            let trigger_epoch = slot.trigger_epoch();

            if trigger_epoch == EpochAction::FREE {
                // Count first so a concurrent pop never sees the counter at zero.
                self.drain_count.fetch_add(1, Ordering::AcqRel);
                match slot.try_push(prior_epoch, callback) {
                    Ok(()) => return prior_epoch + 1,
                    Err(returned) => {
                        self.drain_count.fetch_sub(1, Ordering::AcqRel);
                        callback = returned;
                    }
                }
            } else if EpochAction::is_trigger(trigger_epoch)
                && trigger_epoch <= self.safe_to_reclaim_epoch.load(Ordering::Acquire)
            {
                match slot.try_swap(trigger_epoch, prior_epoch, callback) {
                    Ok(()) => return prior_epoch + 1,
                    Err(returned) => callback = returned,
                }
            }

            i += 1;
            if i == self.drain_list.len() {
                i = 0;
                passes += 1;
                self.compute_new_safe_to_reclaim_epoch(self.current_epoch.load(Ordering::Acquire));
                if passes >= self.saturation_passes {
                    passes = 0;
                    if tracing::enabled!(tracing::Level::WARN) {
                        tracing::warn!(
                            prior_epoch,
                            passes = self.saturation_passes,
                            pending = self.drain_count.load(Ordering::Relaxed),
                            backoff_ms = self.saturation_backoff.as_millis() as u64,
                            "drain list saturated; unable to add epoch trigger"
                        );
                    }
                    thread::sleep(self.saturation_backoff);
                }
            }
        }
    }

    /// Drain pending actions that are now safe to execute
    ///
    /// Recomputes the safe epoch, then makes one pass over the drain list.
    pub fn drain(&self, next_epoch: u64) {
        let safe_epoch = self.compute_new_safe_to_reclaim_epoch(next_epoch);

        for action in self.drain_list.iter() {
            let trigger_epoch = action.trigger_epoch();
            if EpochAction::is_trigger(trigger_epoch)
                && trigger_epoch <= safe_epoch
                && action.try_pop(trigger_epoch)
            {
                tracing::trace!(trigger_epoch, safe_epoch, "ran deferred epoch action");
                if self.drain_count.fetch_sub(1, Ordering::AcqRel) == 1 {
                    break;
                }
            }
        }
    }

    // ============ Reclamation ============

    /// Compute the new safe-to-reclaim epoch by scanning all threads
    ///
    /// The result is `min(current_epoch, oldest protected epoch) - 1`, where
    /// `current_epoch` is capped at the real global epoch. The cached value
    /// never moves backwards; the returned epoch is the cached value after
    /// the update.
    pub fn compute_new_safe_to_reclaim_epoch(&self, current_epoch: u64) -> u64 {
        let mut oldest_ongoing = current_epoch.min(self.current_epoch.load(Ordering::SeqCst));

        for entry in self.table.iter() {
            let entry_epoch = entry.local_current_epoch.load(Ordering::SeqCst);
            if entry_epoch != UNPROTECTED && entry_epoch < oldest_ongoing {
                oldest_ongoing = entry_epoch;
            }
        }

        let safe = oldest_ongoing.saturating_sub(1);
        let previous = self
            .safe_to_reclaim_epoch
            .fetch_max(safe, Ordering::AcqRel);
        previous.max(safe)
    }

    /// Spin wait until the specified epoch is safe to reclaim
    ///
    /// Does not return before `target_safe_epoch` is safe.
    pub fn spin_wait_for_safe_to_reclaim(&self, current_epoch: u64, target_safe_epoch: u64) {
        while self.compute_new_safe_to_reclaim_epoch(current_epoch) < target_safe_epoch {
            hint::spin_loop();
        }
    }

    /// Bounded variant of [`spin_wait_for_safe_to_reclaim`](Self::spin_wait_for_safe_to_reclaim)
    ///
    /// Returns `false` if `target_safe_epoch` was still unsafe after `max_scans` table scans.
    pub fn try_spin_wait_for_safe_to_reclaim(
        &self,
        current_epoch: u64,
        target_safe_epoch: u64,
        max_scans: usize,
    ) -> bool {
        for _ in 0..max_scans {
            if self.compute_new_safe_to_reclaim_epoch(current_epoch) >= target_safe_epoch {
                return true;
            }
            hint::spin_loop();
        }
        false
    }

    /// Check if an epoch is safe to reclaim
    #[inline]
    pub fn is_safe_to_reclaim(&self, epoch: u64) -> bool {
        epoch <= self.safe_to_reclaim_epoch.load(Ordering::Acquire)
    }

    // ============ Phase barrier ============

    /// Reset every slot's phase marker to `Rest`
    pub fn reset_phase_finished(&self) {
        for entry in self.table.iter() {
            entry
                .phase_finished
                .store(Phase::Rest.as_u32(), Ordering::Release);
        }
    }

    /// Mark this thread as having finished the specified phase
    ///
    /// Returns true if every protected thread has finished the phase.
    /// Unprotected slots do not take part.
    pub fn finish_thread_phase(&self, slot: usize, phase: Phase) -> bool {
        self.entry(slot)
            .phase_finished
            .store(phase.as_u32(), Ordering::SeqCst);

        self.table.iter().all(|entry| {
            entry.local_current_epoch.load(Ordering::SeqCst) == UNPROTECTED
                || entry.phase_finished.load(Ordering::SeqCst) == phase.as_u32()
        })
    }

    /// Check if this thread has finished the specified phase
    #[inline]
    pub fn has_thread_finished_phase(&self, slot: usize, phase: Phase) -> bool {
        self.entry(slot).phase_finished.load(Ordering::Acquire) == phase.as_u32()
    }
}

impl Drop for LightEpoch {
    fn drop(&mut self) {
        let pending = self.drain_list.iter().filter(|a| !a.is_free()).count();
        if pending > 0 {
            tracing::debug!(pending, "dropping epoch with unexecuted actions");
        }
    }
}

impl fmt::Debug for LightEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightEpoch")
            .field("current_epoch", &self.current_epoch())
            .field("safe_to_reclaim_epoch", &self.safe_to_reclaim_epoch())
            .field("pending_actions", &self.pending_actions())
            .field("table_size", &self.table_size)
            .finish()
    }
}

/// RAII guard for epoch protection
pub struct EpochGuard<'a> {
    epoch: &'a LightEpoch,
    slot: usize,
    protected_epoch: u64,
}

impl<'a> EpochGuard<'a> {
    /// Protect `slot` until the guard is dropped
    pub fn new(epoch: &'a LightEpoch, slot: usize) -> Self {
        let protected_epoch = epoch.protect(slot);
        Self {
            epoch,
            slot,
            protected_epoch,
        }
    }

    /// Protect `slot` and run any actions that became safe
    pub fn new_and_drain(epoch: &'a LightEpoch, slot: usize) -> Self {
        let protected_epoch = epoch.protect_and_drain(slot);
        Self {
            epoch,
            slot,
            protected_epoch,
        }
    }

    /// Get the slot this guard protects
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Epoch recorded when the guard was taken
    pub fn protected_epoch(&self) -> u64 {
        self.protected_epoch
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.epoch.unprotect(self.slot);
    }
}

/// RAII guard for reentrant epoch protection
pub struct ReentrantEpochGuard<'a> {
    epoch: &'a LightEpoch,
    slot: usize,
}

impl<'a> ReentrantEpochGuard<'a> {
    /// Enter one more protection level on `slot`
    pub fn new(epoch: &'a LightEpoch, slot: usize) -> Self {
        epoch.reentrant_protect(slot);
        Self { epoch, slot }
    }
}

impl Drop for ReentrantEpochGuard<'_> {
    fn drop(&mut self) {
        self.epoch.reentrant_unprotect(self.slot);
    }
}
