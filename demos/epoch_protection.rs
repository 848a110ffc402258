//! Epoch protection walkthrough
//!
//! Shows slot reservation, guards, deferred actions and the phase barrier.
//!
//! Run: cargo run --example epoch_protection

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tinykv_faster::epoch::{EpochGuard, LightEpoch, Phase};
use tinykv_faster::index::HashTable;

fn main() -> tinykv_faster::Result<()> {
    println!("=== tinykv-faster epoch protection ===\n");

    let epoch = Arc::new(LightEpoch::new()?);
    println!("Initial state:");
    println!("  current epoch: {}", epoch.current_epoch());
    println!("  safe-to-reclaim epoch: {}", epoch.safe_to_reclaim_epoch());

    // 1: protect / unprotect on a reserved slot
    println!("\n--- 1: basic protection ---");
    let slot = epoch.reserve_entry()?;
    {
        let protected_epoch = epoch.protect(slot);
        println!("  slot {slot} protected at epoch {protected_epoch}");
        println!("  is protected: {}", epoch.is_protected(slot));
        epoch.unprotect(slot);
        println!("  is protected after unprotect: {}", epoch.is_protected(slot));
    }

    // 2: RAII guard around a bucket update
    println!("\n--- 2: EpochGuard around an index update ---");
    let table = HashTable::builder().size(1 << 10).build()?;
    {
        let guard = EpochGuard::new(&epoch, slot);
        let bucket = table.get_bucket(b"user:42");
        bucket.entries[0].set_address(0x1000);
        bucket.entries[0].set_tag(table.hash_key(b"user:42").tag());
        println!(
            "  wrote {:?} at epoch {}",
            bucket.entries[0],
            guard.protected_epoch()
        );
    }
    println!("  guard dropped, is protected: {}", epoch.is_protected(slot));

    // 3: a deferred action held back by a protected reader
    println!("\n--- 3: deferred action ---");
    let freed = Arc::new(AtomicU64::new(0));
    {
        let _reader = EpochGuard::new(&epoch, slot);
        let freed_in_action = freed.clone();
        let new_epoch = epoch.bump_current_epoch_with_action(move || {
            freed_in_action.fetch_add(1, Ordering::SeqCst);
        });
        println!("  action registered, epoch now {new_epoch}");
        epoch.drain(epoch.current_epoch());
        println!("  runs while reader protected: {}", freed.load(Ordering::SeqCst));
    }
    epoch.drain(epoch.current_epoch());
    println!("  runs after reader left: {}", freed.load(Ordering::SeqCst));
    epoch.release_entry(slot);

    // 4: phase barrier across worker threads
    println!("\n--- 4: phase barrier ---");
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let epoch = epoch.clone();
            thread::spawn(move || -> tinykv_faster::Result<bool> {
                let slot = epoch.reserve_entry()?;
                let done = {
                    let _guard = EpochGuard::new(&epoch, slot);
                    epoch.finish_thread_phase(slot, Phase::Prepare)
                };
                println!("  worker {worker} (slot {slot}) finished Prepare, barrier complete: {done}");
                epoch.release_entry(slot);
                Ok(done)
            })
        })
        .collect();
    for handle in handles {
        match handle.join() {
            Ok(result) => {
                result?;
            }
            Err(_) => println!("  worker panicked"),
        }
    }

    println!("\nFinal state: {epoch:?}");
    println!("\n=== done ===");
    Ok(())
}
