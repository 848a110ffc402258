//! Loom-based model-checked tests for packed bucket entry updates.
//!
//! A self-contained model of `AtomicHashBucketEntry` from
//! `src/index/hash_bucket.rs`: address in the low 48 bits, a 14-bit tag at
//! bit 48 and the tentative flag at bit 63. Field setters are CAS retry
//! loops over the whole word, so concurrent updates of different fields must
//! all survive.
//!
//! Run with:
//! ```bash
//! cargo test --test loom_cas
//! ```

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;

const ADDRESS_MASK: u64 = (1 << 48) - 1;
const TAG_SHIFT: u32 = 48;
const TAG_MASK: u64 = (1 << 14) - 1;
const TENTATIVE_BIT: u64 = 1 << 63;

struct AtomicEntry(AtomicU64);

impl AtomicEntry {
    fn new(val: u64) -> Self {
        Self(AtomicU64::new(val))
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn cas(&self, expected: u64, new: u64) -> Result<u64, u64> {
        self.0
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Read-modify-write retry loop, as the production field setters do.
    fn update(&self, f: impl Fn(u64) -> u64) {
        loop {
            let old = self.load();
            if self.cas(old, f(old)).is_ok() {
                return;
            }
        }
    }

    fn set_address(&self, address: u64) {
        self.update(|w| (w & !ADDRESS_MASK) | (address & ADDRESS_MASK));
    }

    fn set_tag(&self, tag: u64) {
        self.update(|w| (w & !(TAG_MASK << TAG_SHIFT)) | ((tag & TAG_MASK) << TAG_SHIFT));
    }

    fn set_tentative(&self) {
        self.0.fetch_or(TENTATIVE_BIT, Ordering::AcqRel);
    }
}

/// Two threads race to CAS-insert into an empty bucket entry.
/// Exactly one must succeed; the loser must see the winner's value.
#[test]
fn test_loom_cas_insert_race() {
    loom::model(|| {
        let entry = Arc::new(AtomicEntry::new(0));

        let e1 = Arc::clone(&entry);
        let e2 = Arc::clone(&entry);

        let h1 = thread::spawn(move || e1.cas(0, 100));
        let h2 = thread::spawn(move || e2.cas(0, 200));

        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();

        assert!(r1.is_ok() ^ r2.is_ok());

        let final_val = entry.load();
        match (r1, r2) {
            (Ok(_), Err(witness)) => {
                assert_eq!(final_val, 100);
                assert_eq!(witness, 100);
            }
            (Err(witness), Ok(_)) => {
                assert_eq!(final_val, 200);
                assert_eq!(witness, 200);
            }
            _ => unreachable!(),
        }
    });
}

/// Address and tag written concurrently: both fields land.
#[test]
fn test_loom_address_and_tag_updates() {
    loom::model(|| {
        let entry = Arc::new(AtomicEntry::new(0));

        let e1 = Arc::clone(&entry);
        let e2 = Arc::clone(&entry);

        let h1 = thread::spawn(move || e1.set_address(0xabcd));
        let h2 = thread::spawn(move || e2.set_tag(0x1234));

        h1.join().unwrap();
        h2.join().unwrap();

        let word = entry.load();
        assert_eq!(word & ADDRESS_MASK, 0xabcd);
        assert_eq!((word >> TAG_SHIFT) & TAG_MASK, 0x1234);
        assert_eq!(word & TENTATIVE_BIT, 0);
    });
}

/// The tentative flag set with fetch_or survives a racing address update.
#[test]
fn test_loom_tentative_survives_address_update() {
    loom::model(|| {
        let entry = Arc::new(AtomicEntry::new(7));

        let e1 = Arc::clone(&entry);
        let e2 = Arc::clone(&entry);

        let h1 = thread::spawn(move || e1.set_tentative());
        let h2 = thread::spawn(move || e2.set_address(42));

        h1.join().unwrap();
        h2.join().unwrap();

        let word = entry.load();
        assert_ne!(word & TENTATIVE_BIT, 0);
        assert_eq!(word & ADDRESS_MASK, 42);
    });
}

/// Hash chain insert: each thread links to the head it read, then CASes
/// itself in. Both records end up in the chain.
#[test]
fn test_loom_hash_chain_insert() {
    loom::model(|| {
        let head = Arc::new(AtomicEntry::new(0));
        let record_a_prev = Arc::new(AtomicU64::new(0));
        let record_b_prev = Arc::new(AtomicU64::new(0));

        let insert = |head: Arc<AtomicEntry>, prev: Arc<AtomicU64>, address: u64| {
            thread::spawn(move || loop {
                let old_head = head.load();
                prev.store(old_head, Ordering::Release);
                if head.cas(old_head, address).is_ok() {
                    return;
                }
            })
        };

        let ha = insert(Arc::clone(&head), Arc::clone(&record_a_prev), 10);
        let hb = insert(Arc::clone(&head), Arc::clone(&record_b_prev), 20);

        ha.join().unwrap();
        hb.join().unwrap();

        let final_head = head.load();
        if final_head == 10 {
            assert_eq!(record_a_prev.load(Ordering::Acquire), 20);
        } else {
            assert_eq!(final_head, 20);
            assert_eq!(record_b_prev.load(Ordering::Acquire), 10);
        }
    });
}
