use lcgraph::concurrency::lock_context;
use lcgraph::{NoLock, NodeLock, SpinLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

#[test]
fn test_concurrent_try_lock_has_one_winner() {
    for _ in 0..200 {
        let lock = SpinLock::new();
        let barrier = Barrier::new(2);
        let wins = AtomicUsize::new(0);
        let winner = AtomicUsize::new(0);
        thread::scope(|s| {
            for tag in [7usize, 9] {
                let (lock, barrier, wins, winner) = (&lock, &barrier, &wins, &winner);
                s.spawn(move || {
                    barrier.wait();
                    if lock.try_lock(tag) {
                        wins.fetch_add(1, Ordering::Relaxed);
                        winner.store(tag, Ordering::Relaxed);
                    }
                });
            }
        });
        assert_eq!(wins.load(Ordering::Relaxed), 1);
        assert_eq!(lock.value(), winner.load(Ordering::Relaxed));
        lock.unlock();
        assert_eq!(lock.value(), 0);
    }
}

#[test]
fn test_lock_serialises_step_scoped_critical_sections() {
    let lock = SpinLock::new();
    let inside = AtomicUsize::new(0);
    let total = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..500 {
                    lock_context::step(|| {
                        // SAFETY: `lock` outlives every step on these threads.
                        unsafe { lock_context::acquire(&lock) };
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }
    });
    assert_eq!(total.load(Ordering::Relaxed), 2000);
    assert!(!lock.is_locked());
}

#[test]
fn test_no_lock_is_free() {
    assert_eq!(std::mem::size_of::<NoLock>(), 0);
    assert!(!<NoLock as NodeLock>::IS_LOCKING);
    let lock = NoLock;
    assert!(NodeLock::try_lock(&lock, 3));
    assert!(NodeLock::try_lock(&lock, 3));
    NodeLock::unlock(&lock);
}
