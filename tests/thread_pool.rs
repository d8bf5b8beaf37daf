use lcgraph::concurrency::pool::{self, current_worker, ThreadPool};
use lcgraph::concurrency::{do_all, Executable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[test]
fn test_run_is_a_barrier_for_many_sizes() {
    for n in [1, 2, 3, 7, 16, 33] {
        let mut pool = ThreadPool::new(n);
        assert_eq!(pool.size(), n);
        let counter = AtomicUsize::new(0);
        for round in 1..=20 {
            pool.run(&|_: usize, threads: usize| {
                assert_eq!(threads, n);
                counter.fetch_add(1, Ordering::Relaxed);
            });
            assert_eq!(counter.load(Ordering::Relaxed), round * n);
        }
    }
}

#[test]
fn test_pool_of_three_labels_each_slot_once() {
    let mut pool = ThreadPool::new(3);
    let slots: Vec<AtomicUsize> = (0..3).map(|_| AtomicUsize::new(usize::MAX)).collect();
    pool.run(&|tid: usize, _: usize| {
        slots[tid].store(tid, Ordering::Relaxed);
    });
    let mut labels: Vec<usize> = slots.iter().map(|s| s.load(Ordering::Relaxed)).collect();
    labels.sort_unstable();
    assert_eq!(labels, vec![0, 1, 2]);
}

struct Phased {
    before: AtomicUsize,
    ran: AtomicUsize,
    after: Mutex<Option<usize>>,
}

impl Executable for Phased {
    fn pre_run(&self, threads: usize) {
        self.before.store(threads, Ordering::Relaxed);
    }

    fn run(&self, _tid: usize, _threads: usize) {
        self.ran.fetch_add(1, Ordering::Relaxed);
    }

    fn post_run(&self) {
        *self.after.lock().unwrap() = Some(self.ran.load(Ordering::Relaxed));
    }
}

#[test]
fn test_pre_and_post_run_bracket_the_workers() {
    let mut pool = ThreadPool::new(4);
    let work = Phased {
        before: AtomicUsize::new(0),
        ran: AtomicUsize::new(0),
        after: Mutex::new(None),
    };
    pool.run(&work);
    assert_eq!(work.before.load(Ordering::Relaxed), 4);
    assert_eq!(*work.after.lock().unwrap(), Some(4));
}

#[test]
fn test_resize_to_zero_and_back() {
    let mut pool = ThreadPool::new(2);
    pool.resize(0);
    let counter = AtomicUsize::new(0);
    pool.run(&|_: usize, _: usize| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(counter.load(Ordering::Relaxed), 0);
    pool.resize(6);
    pool.run(&|_: usize, _: usize| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(counter.load(Ordering::Relaxed), 6);
}

#[test]
fn test_pinned_pool_runs() {
    let mut pool = ThreadPool::with_pinning(2, true);
    let seen = AtomicUsize::new(0);
    pool.run(&|tid: usize, _: usize| {
        assert_eq!(current_worker(), Some(tid));
        seen.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(seen.load(Ordering::Relaxed), 2);
}

#[test]
fn test_repeated_runs_hit_each_worker_once() {
    let mut pool = ThreadPool::new(3);
    let hits: Vec<AtomicUsize> = (0..3).map(|_| AtomicUsize::new(0)).collect();
    for _ in 0..1000 {
        pool.run(&|tid: usize, _: usize| {
            hits[tid].fetch_add(1, Ordering::Relaxed);
        });
        let counts: Vec<usize> = hits.iter().map(|h| h.swap(0, Ordering::Relaxed)).collect();
        assert_eq!(counts, vec![1, 1, 1]);
    }
}

#[test]
fn test_system_pool_on_each_and_do_all() {
    assert_eq!(pool::set_active_threads(4), 4);

    let calls: Vec<AtomicUsize> = (0..4).map(|_| AtomicUsize::new(0)).collect();
    pool::on_each(|tid, n| {
        assert_eq!(n, 4);
        calls[tid].fetch_add(1, Ordering::Relaxed);
    });
    assert!(calls.iter().all(|c| c.load(Ordering::Relaxed) == 1));

    let hits: Vec<AtomicUsize> = (0..10_000).map(|_| AtomicUsize::new(0)).collect();
    do_all(0..10_000, |n| {
        hits[n as usize].fetch_add(1, Ordering::Relaxed);
    });
    assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
}
