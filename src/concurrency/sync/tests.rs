use super::*;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_wait_on_u32_wake() {
    let flag = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(2));
    let flag_thread = flag.clone();
    let barrier_thread = barrier.clone();

    let handle = thread::spawn(move || {
        barrier_thread.wait();
        while flag_thread.load(Ordering::SeqCst) == 0 {
            wait_on_u32(&flag_thread, 0);
        }
        flag_thread.load(Ordering::SeqCst)
    });

    barrier.wait();
    flag.store(1, Ordering::SeqCst);
    wake_all_u32(&flag);

    assert_eq!(handle.join().unwrap(), 1);
}

#[test]
fn test_spin_lock_try_lock_records_tag() {
    let lock = SpinLock::new();
    assert!(!lock.is_locked());
    assert!(lock.try_lock(7));
    assert_eq!(lock.value(), 7);
    assert!(!lock.try_lock(9));
    assert_eq!(lock.value(), 7);
    lock.unlock();
    assert_eq!(lock.value(), 0);
    lock.lock_default();
    assert_eq!(lock.value(), SpinLock::DEFAULT_TAG);
    lock.unlock();
}

#[test]
#[should_panic(expected = "not held")]
fn test_spin_lock_unlock_unheld_panics() {
    SpinLock::new().unlock();
}

#[test]
#[should_panic(expected = "non-zero")]
fn test_spin_lock_zero_tag_panics() {
    SpinLock::new().try_lock(0);
}

#[test]
fn test_no_lock_is_trivial() {
    let lock = NoLock;
    assert!(NodeLock::try_lock(&lock, 1));
    assert!(NodeLock::try_lock(&lock, 2));
    NodeLock::lock(&lock, 3);
    NodeLock::unlock(&lock);
    NodeLock::unlock(&lock);
    assert_eq!(NodeLock::value(&lock), 0);
}

#[test]
fn test_spin_lock_mutual_exclusion() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 2_000;

    let lock = SpinLock::new();
    let counter = std::cell::UnsafeCell::new(0usize);
    struct Shared<'a>(&'a std::cell::UnsafeCell<usize>);
    unsafe impl Sync for Shared<'_> {}
    let shared = Shared(&counter);

    thread::scope(|s| {
        for t in 0..THREADS {
            let lock = &lock;
            let shared = &shared;
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    lock.lock(t + 1);
                    // SAFETY: guarded by `lock`.
                    unsafe { *shared.0.get() += 1 };
                    lock.unlock();
                }
            });
        }
    });

    assert_eq!(counter.into_inner(), THREADS * ROUNDS);
}

#[test]
fn test_semaphore_release_acquire() {
    let sem = Semaphore::new(0);
    sem.release(3);
    assert_eq!(sem.available(), 3);
    sem.acquire(2);
    assert!(sem.try_acquire());
    assert!(!sem.try_acquire());
}

#[test]
fn test_semaphore_blocks_until_released() {
    let sem = Arc::new(Semaphore::new(0));
    let waiter = {
        let sem = sem.clone();
        thread::spawn(move || sem.acquire(2))
    };
    sem.release(1);
    sem.release(1);
    waiter.join().unwrap();
    assert_eq!(sem.available(), 0);
}
