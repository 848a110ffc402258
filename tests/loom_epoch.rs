//! Loom-based model-checked tests for epoch protection algorithms.
//!
//! These tests replicate the protect / safe-epoch scan and the drain-list
//! slot protocol from `src/epoch/` in self-contained test-local structs that
//! use loom atomics, so Loom can explore every interleaving without touching
//! production code.
//!
//! Run with:
//! ```bash
//! cargo test --test loom_epoch
//! ```

use loom::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;

// ---------------------------------------------------------------------------
// Test-local harness: protect / unprotect / bump / safe-to-reclaim.
//
// The production table is cache aligned and sized for many threads; two
// slots are enough to expose the races that matter here.
// ---------------------------------------------------------------------------

const UNPROTECTED: u64 = 0;

struct TestLightEpoch {
    table: [AtomicU64; 2],
    current_epoch: AtomicU64,
    safe_to_reclaim_epoch: AtomicU64,
}

impl TestLightEpoch {
    fn new() -> Self {
        Self {
            table: [AtomicU64::new(UNPROTECTED), AtomicU64::new(UNPROTECTED)],
            current_epoch: AtomicU64::new(1),
            safe_to_reclaim_epoch: AtomicU64::new(0),
        }
    }

    fn protect(&self, tid: usize) -> u64 {
        let epoch = self.current_epoch.load(Ordering::SeqCst);
        self.table[tid].store(epoch, Ordering::SeqCst);
        epoch
    }

    fn unprotect(&self, tid: usize) {
        self.table[tid].store(UNPROTECTED, Ordering::SeqCst);
    }

    fn bump_current_epoch(&self) -> u64 {
        self.current_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Scan the table; the cached value only moves forward.
    fn compute_safe_to_reclaim(&self, current_epoch: u64) -> u64 {
        let mut oldest = current_epoch.min(self.current_epoch.load(Ordering::SeqCst));
        for entry in &self.table {
            let e = entry.load(Ordering::SeqCst);
            if e != UNPROTECTED && e < oldest {
                oldest = e;
            }
        }
        let safe = oldest.saturating_sub(1);
        self.safe_to_reclaim_epoch
            .fetch_max(safe, Ordering::AcqRel)
            .max(safe)
    }
}

// ---------------------------------------------------------------------------
// Test-local harness: one drain-list slot.
//
// The state word is FREE, LOCKED or a trigger epoch. Running the action is
// modelled as bumping `runs`.
// ---------------------------------------------------------------------------

const FREE: u64 = u64::MAX;
const LOCKED: u64 = u64::MAX - 1;

struct TestAction {
    epoch: AtomicU64,
    runs: AtomicU32,
}

impl TestAction {
    fn new() -> Self {
        Self {
            epoch: AtomicU64::new(FREE),
            runs: AtomicU32::new(0),
        }
    }

    fn try_push(&self, prior_epoch: u64) -> bool {
        if self
            .epoch
            .compare_exchange(FREE, LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.epoch.store(prior_epoch, Ordering::Release);
        true
    }

    fn try_pop(&self, expected: u64) -> bool {
        if self
            .epoch
            .compare_exchange(expected, LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.runs.fetch_add(1, Ordering::AcqRel);
        self.epoch.store(FREE, Ordering::Release);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Two threads concurrently bump the epoch counter.
#[test]
fn test_loom_epoch_advance() {
    loom::model(|| {
        let epoch = Arc::new(TestLightEpoch::new());

        let e1 = Arc::clone(&epoch);
        let e2 = Arc::clone(&epoch);

        let h1 = thread::spawn(move || e1.bump_current_epoch());
        let h2 = thread::spawn(move || e2.bump_current_epoch());

        let a = h1.join().unwrap();
        let b = h2.join().unwrap();

        assert_ne!(a, b);
        assert_eq!(epoch.current_epoch.load(Ordering::SeqCst), 3);
    });
}

/// While a slot stays protected, concurrent bumps and scans never report
/// its epoch as safe.
#[test]
fn test_loom_protected_epoch_never_safe() {
    loom::model(|| {
        let epoch = Arc::new(TestLightEpoch::new());
        let local = epoch.protect(0);

        let e1 = Arc::clone(&epoch);
        let e2 = Arc::clone(&epoch);

        let bumper = thread::spawn(move || {
            let next = e1.bump_current_epoch();
            e1.compute_safe_to_reclaim(next)
        });
        let scanner = thread::spawn(move || e2.compute_safe_to_reclaim(u64::MAX));

        assert!(bumper.join().unwrap() < local);
        assert!(scanner.join().unwrap() < local);

        epoch.unprotect(0);
        assert_eq!(epoch.compute_safe_to_reclaim(u64::MAX), 1);
    });
}

/// Concurrent scans never move the cached safe epoch backwards.
#[test]
fn test_loom_safe_epoch_monotonic() {
    loom::model(|| {
        let epoch = Arc::new(TestLightEpoch::new());
        epoch.bump_current_epoch();
        epoch.bump_current_epoch();

        let e1 = Arc::clone(&epoch);
        let e2 = Arc::clone(&epoch);

        // A stale caller passing an old epoch races a current one.
        let h1 = thread::spawn(move || e1.compute_safe_to_reclaim(1));
        let h2 = thread::spawn(move || e2.compute_safe_to_reclaim(3));

        h1.join().unwrap();
        h2.join().unwrap();

        assert_eq!(epoch.safe_to_reclaim_epoch.load(Ordering::SeqCst), 2);
    });
}

/// Two drainers race to pop the same action: it runs exactly once and the
/// slot ends up free.
#[test]
fn test_loom_action_runs_once() {
    loom::model(|| {
        let action = Arc::new(TestAction::new());
        assert!(action.try_push(5));

        let a1 = Arc::clone(&action);
        let a2 = Arc::clone(&action);

        let h1 = thread::spawn(move || a1.try_pop(5));
        let h2 = thread::spawn(move || a2.try_pop(5));

        let popped_1 = h1.join().unwrap();
        let popped_2 = h2.join().unwrap();

        assert!(popped_1 ^ popped_2);
        assert_eq!(action.runs.load(Ordering::SeqCst), 1);
        assert_eq!(action.epoch.load(Ordering::SeqCst), FREE);
    });
}

/// A registration racing a drain on the same slot: the drained action runs
/// once and at most one new action occupies the slot.
#[test]
fn test_loom_push_races_pop() {
    loom::model(|| {
        let action = Arc::new(TestAction::new());
        assert!(action.try_push(1));

        let a1 = Arc::clone(&action);
        let a2 = Arc::clone(&action);

        let drainer = thread::spawn(move || a1.try_pop(1));
        let registrar = thread::spawn(move || a2.try_push(7));

        let popped = drainer.join().unwrap();
        let pushed = registrar.join().unwrap();

        // The push can only land after the pop freed the slot.
        if pushed {
            assert!(popped);
            assert_eq!(action.epoch.load(Ordering::SeqCst), 7);
        }
        if popped {
            assert_eq!(action.runs.load(Ordering::SeqCst), 1);
        }
        assert!(popped);
    });
}

/// Two threads race to claim a single epoch table slot; exactly one wins.
#[test]
fn test_loom_slot_reservation() {
    loom::model(|| {
        let in_use = Arc::new(AtomicU32::new(0));

        let s1 = Arc::clone(&in_use);
        let s2 = Arc::clone(&in_use);

        let h1 = thread::spawn(move || {
            s1.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        });
        let h2 = thread::spawn(move || {
            s2.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        });

        let won_1 = h1.join().unwrap();
        let won_2 = h2.join().unwrap();

        assert!(won_1 ^ won_2);
        assert_eq!(in_use.load(Ordering::Acquire), 1);
    });
}
