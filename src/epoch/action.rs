//! Deferred actions held in the epoch drain list
//!
//! A slot's state lives in a single atomic word: [`EpochAction::FREE`],
//! [`EpochAction::LOCKED`], or the trigger epoch of the callback it holds.
//! The callback cell is only touched while the word is `LOCKED`, and the word
//! is published after the cell is written, which makes push, pop and swap
//! linearizable under compare-and-swap.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback run once its trigger epoch is safe to reclaim.
pub(crate) type EpochCallback = Box<dyn FnOnce() + Send + 'static>;

/// One slot of the drain list
pub(crate) struct EpochAction {
    /// Trigger epoch, or one of the FREE / LOCKED sentinels
    epoch: AtomicU64,
    /// The callback to invoke
    callback: UnsafeCell<Option<EpochCallback>>,
}

impl EpochAction {
    /// Epoch value indicating this slot is free
    pub(crate) const FREE: u64 = u64::MAX;
    /// Epoch value indicating this slot is locked
    pub(crate) const LOCKED: u64 = u64::MAX - 1;

    pub(crate) const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(Self::FREE),
            callback: UnsafeCell::new(None),
        }
    }

    /// Current state word of the slot
    #[inline]
    pub(crate) fn trigger_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether the slot holds no action
    #[inline]
    pub(crate) fn is_free(&self) -> bool {
        self.trigger_epoch() == Self::FREE
    }

    /// Whether `epoch` names a real trigger rather than a sentinel
    #[inline]
    pub(crate) const fn is_trigger(epoch: u64) -> bool {
        epoch != Self::FREE && epoch != Self::LOCKED
    }

    /// Pop and run the action if it still carries `expected_epoch`.
    ///
    /// Returns `true` if this call ran the callback.
    pub(crate) fn try_pop(&self, expected_epoch: u64) -> bool {
        if self
            .epoch
            .compare_exchange(
                expected_epoch,
                Self::LOCKED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        // SAFETY: the slot is LOCKED by us; no other thread touches the cell.
        let callback = unsafe { (*self.callback.get()).take() };
        self.epoch.store(Self::FREE, Ordering::Release);

        if let Some(cb) = callback {
            cb();
        }
        true
    }

    /// Store `callback` in a free slot, to fire once `prior_epoch` is safe.
    ///
    /// Hands the callback back if the slot was not free.
    pub(crate) fn try_push(
        &self,
        prior_epoch: u64,
        callback: EpochCallback,
    ) -> Result<(), EpochCallback> {
        debug_assert!(Self::is_trigger(prior_epoch));
        if self
            .epoch
            .compare_exchange(Self::FREE, Self::LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(callback);
        }

        // SAFETY: the slot is LOCKED by us.
        unsafe {
            *self.callback.get() = Some(callback);
        }
        self.epoch.store(prior_epoch, Ordering::Release);
        Ok(())
    }

    /// Replace the action carrying `expected_epoch` with `callback`, then run
    /// the displaced action.
    ///
    /// Hands the new callback back if the slot changed underneath us.
    pub(crate) fn try_swap(
        &self,
        expected_epoch: u64,
        prior_epoch: u64,
        callback: EpochCallback,
    ) -> Result<(), EpochCallback> {
        debug_assert!(Self::is_trigger(prior_epoch));
        if self
            .epoch
            .compare_exchange(
                expected_epoch,
                Self::LOCKED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(callback);
        }

        // SAFETY: the slot is LOCKED by us.
        let displaced = unsafe { (*self.callback.get()).replace(callback) };
        self.epoch.store(prior_epoch, Ordering::Release);

        if let Some(cb) = displaced {
            cb();
        }
        Ok(())
    }
}

impl fmt::Debug for EpochAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let epoch = self.trigger_epoch();
        let mut s = f.debug_struct("EpochAction");
        match epoch {
            Self::FREE => s.field("state", &"free"),
            Self::LOCKED => s.field("state", &"locked"),
            e => s.field("trigger_epoch", &e),
        };
        s.finish()
    }
}

// Safety: the callback cell is only accessed by the thread holding the LOCKED state
unsafe impl Send for EpochAction {}
unsafe impl Sync for EpochAction {}
