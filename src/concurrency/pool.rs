//! Fork/join barrier executor.
//!
//! A [`ThreadPool`] owns a fixed set of OS threads, each parked on its own start
//! semaphore. [`ThreadPool::run`] publishes one unit of work, hands every worker a single
//! start permit and blocks on the shared finish semaphore until all of them have
//! signalled back. A worker cannot consume another worker's permit, so each runs the
//! work exactly once per call.
//!
//! ```text
//! submitter:  publish(work) -> start[i].release(1) for all i -> finish.acquire(n) -> clear(work)
//! worker i:   start[i].acquire(1) -> work.run(i, n) -> finish.release(1) -> repeat
//! ```
//!
//! The process-wide pool used by the graph and by [`do_all`](super::do_all) is reached
//! through [`system_pool`]; it is created on first use and torn down only by
//! [`shutdown_system_pool`].

use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};

use crossbeam_utils::CachePadded;

use crate::concurrency::lock_context;
use crate::concurrency::sync::Semaphore;
use crate::config::RuntimeConfig;

/// A unit of work run once by every worker of a pool.
pub trait Executable: Sync {
    /// Called on the submitting thread before any worker starts.
    fn pre_run(&self, _threads: usize) {}

    /// Body executed by worker `tid` of `threads`.
    fn run(&self, tid: usize, threads: usize);

    /// Called on the submitting thread after every worker has finished.
    fn post_run(&self) {}
}

impl<F> Executable for F
where
    F: Fn(usize, usize) + Sync,
{
    #[inline]
    fn run(&self, tid: usize, threads: usize) {
        self(tid, threads);
    }
}

type WorkPtr = *const (dyn Executable + 'static);

struct Shared {
    finish: CachePadded<Semaphore>,
    shutdown: AtomicBool,
    threads: AtomicUsize,
    // Written only by the submitter while every worker is parked on its start
    // semaphore; the release/acquire pair orders the write before the workers' reads.
    work: UnsafeCell<Option<WorkPtr>>,
    panic: Mutex<Option<Box<dyn Any + Send>>>,
}

// SAFETY: `work` is only mutated while no worker is between its start acquire and
// `finish.release`, see `ThreadPool::run`.
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Index of the calling thread within the pool that spawned it, or `None` outside a worker.
pub fn current_worker() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

struct Worker {
    start: Arc<CachePadded<Semaphore>>,
    handle: JoinHandle<()>,
}

/// A fixed-size pool of OS threads with a fork/join `run`.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<Worker>,
    pin_threads: bool,
}

impl ThreadPool {
    /// Spawns a pool with `threads` workers.
    pub fn new(threads: usize) -> Self {
        Self::with_pinning(threads, false)
    }

    /// Spawns a pool whose workers pin themselves to CPU `tid % cpus` when `pin_threads` is set.
    pub fn with_pinning(threads: usize, pin_threads: bool) -> Self {
        let shared = Arc::new(Shared {
            finish: CachePadded::new(Semaphore::new(0)),
            shutdown: AtomicBool::new(false),
            threads: AtomicUsize::new(0),
            work: UnsafeCell::new(None),
            panic: Mutex::new(None),
        });
        let mut pool = Self {
            shared,
            workers: Vec::new(),
            pin_threads,
        };
        pool.resize(threads);
        pool
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Runs `work` once on every worker and returns when all have finished.
    ///
    /// `&mut self` makes overlapping runs on one pool impossible. With zero workers
    /// nothing is executed. A panic inside `work` is re-raised here after the barrier.
    pub fn run(&mut self, work: &dyn Executable) {
        let threads = self.workers.len();
        work.pre_run(threads);

        // SAFETY: the `'static` is a lie confined to this call: the pointer is cleared
        // below, after `finish.acquire(threads)` proves no worker still uses it.
        let ptr: WorkPtr = unsafe { core::mem::transmute::<&dyn Executable, &'static dyn Executable>(work) };
        unsafe { *self.shared.work.get() = Some(ptr) };
        self.shared.threads.store(threads, Ordering::Relaxed);

        self.start_all();
        self.shared.finish.acquire(Self::permits(threads));

        unsafe { *self.shared.work.get() = None };
        work.post_run();

        let payload = match self.shared.panic.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }

    /// Replaces the workers with exactly `threads` fresh ones.
    ///
    /// Existing workers finish any in-flight cycle, observe the shutdown flag and are
    /// joined before the new ones are spawned. `resize(0)` tears the pool down.
    pub fn resize(&mut self, threads: usize) {
        let old = self.workers.len();
        self.shared.shutdown.store(true, Ordering::Release);
        self.start_all();
        self.shared.finish.acquire(Self::permits(old));
        for worker in self.workers.drain(..) {
            if worker.handle.join().is_err() {
                tracing::error!("thread pool worker terminated abnormally");
                std::process::abort();
            }
        }
        self.shared.shutdown.store(false, Ordering::Release);

        self.workers.reserve(threads);
        for tid in 0..threads {
            let shared = Arc::clone(&self.shared);
            let start = Arc::new(CachePadded::new(Semaphore::new(0)));
            let signal = Arc::clone(&start);
            let pin = self.pin_threads;
            let spawned = thread::Builder::new()
                .name(format!("lcgraph-worker-{tid}"))
                .spawn(move || worker_loop(&shared, &signal, tid, pin));
            match spawned {
                Ok(handle) => self.workers.push(Worker { start, handle }),
                Err(err) => {
                    tracing::error!(%err, tid, "failed to spawn thread pool worker");
                    std::process::abort();
                }
            }
        }
        tracing::info!(from = old, to = threads, "thread pool resized");
    }

    fn start_all(&self) {
        for worker in &self.workers {
            worker.start.release(1);
        }
    }

    fn permits(threads: usize) -> u32 {
        u32::try_from(threads).unwrap_or_else(|_| {
            tracing::error!(threads, "thread count exceeds semaphore range");
            std::process::abort()
        })
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.resize(0);
    }
}

fn worker_loop(shared: &Shared, start: &Semaphore, tid: usize, pin: bool) {
    WORKER_ID.with(|id| id.set(Some(tid)));
    if pin {
        pin_current_thread(tid);
    }
    tracing::trace!(tid, "worker started");
    loop {
        start.acquire(1);
        if shared.shutdown.load(Ordering::Acquire) {
            shared.finish.release(1);
            break;
        }
        // SAFETY: published by `run` before this worker's start permit.
        if let Some(work) = unsafe { *shared.work.get() } {
            let threads = shared.threads.load(Ordering::Relaxed);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { (*work).run(tid, threads) }));
            lock_context::release_held_locks();
            if let Err(payload) = outcome {
                let mut slot = match shared.panic.lock() {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
                slot.get_or_insert(payload);
            }
        }
        shared.finish.release(1);
    }
    tracing::trace!(tid, "worker exiting");
}

#[cfg(target_os = "linux")]
fn pin_current_thread(tid: usize) {
    let cpus = thread::available_parallelism().map_or(1, usize::from);
    let cpu = tid % cpus;
    // SAFETY: `set` is a plain bitmask initialised by CPU_ZERO.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = core::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, core::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        tracing::debug!(tid, cpu, "sched_setaffinity failed; worker left unpinned");
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_current_thread(_tid: usize) {}

static SYSTEM_POOL: OnceLock<Mutex<ThreadPool>> = OnceLock::new();
static ACTIVE_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Creates the process-wide pool from `config` unless it already exists.
///
/// Returns `false` when an earlier initialisation won.
pub(crate) fn init_system_pool(config: &RuntimeConfig) -> bool {
    let mut created = false;
    SYSTEM_POOL.get_or_init(|| {
        created = true;
        let threads = config.resolved_threads();
        ACTIVE_THREADS.store(threads, Ordering::Release);
        Mutex::new(ThreadPool::with_pinning(threads, config.pin_threads))
    });
    created
}

/// Exclusive handle to the process-wide pool, created from the environment on first use.
///
/// Must not be called from a worker of that pool: the lock is held for the duration of
/// every system-pool `run`.
pub fn system_pool() -> MutexGuard<'static, ThreadPool> {
    let pool = SYSTEM_POOL.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        let threads = config.resolved_threads();
        ACTIVE_THREADS.store(threads, Ordering::Release);
        Mutex::new(ThreadPool::with_pinning(threads, config.pin_threads))
    });
    match pool.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Worker count of the process-wide pool.
pub fn active_threads() -> usize {
    if SYSTEM_POOL.get().is_none() {
        drop(system_pool());
    }
    ACTIVE_THREADS.load(Ordering::Acquire)
}

/// Resizes the process-wide pool to `threads` (at least one) and returns the new size.
pub fn set_active_threads(threads: usize) -> usize {
    let threads = threads.max(1);
    let mut pool = system_pool();
    if pool.size() != threads {
        pool.resize(threads);
    }
    ACTIVE_THREADS.store(threads, Ordering::Release);
    threads
}

/// Joins every worker of the process-wide pool. A later submission runs on zero workers
/// until [`set_active_threads`] is called again.
pub fn shutdown_system_pool() {
    if let Some(pool) = SYSTEM_POOL.get() {
        let mut pool = match pool.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.resize(0);
        ACTIVE_THREADS.store(0, Ordering::Release);
    }
}

/// Runs `f(tid, threads)` once per worker of the process-wide pool.
///
/// Called from inside any pool worker, `f(0, 1)` runs inline instead, so nested parallel
/// sections degrade to serial execution rather than deadlocking.
pub fn on_each<F>(f: F)
where
    F: Fn(usize, usize) + Sync,
{
    if current_worker().is_some() {
        f(0, 1);
        return;
    }
    let mut pool = system_pool();
    if pool.size() == 0 {
        drop(pool);
        f(0, 1);
        return;
    }
    pool.run(&f);
}
