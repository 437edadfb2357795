//! A fixed-size thread pool for background scans.
//!
//! Work items are submitted with [`ThreadPool::spawn`] and waited on through the
//! returned [`JoinHandle`], or run fire-and-forget with
//! [`ThreadPool::spawn_detached`].

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread,
};

use crate::{join_handle::JoinHandle, oneshot};

/// A pool of worker threads pulling tasks from a shared queue.
///
/// `ThreadPool` is cheap to clone; all clones submit to the same workers.
/// Workers exit once every clone has been dropped and the queue drained.
#[derive(Clone)]
pub struct ThreadPool(Sender<TaskFn>);

type TaskFn = Box<dyn FnOnce() + Send + 'static>;

impl ThreadPool {
    /// Creates a pool with `num_threads` unnamed workers.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> Self {
        Self::with_thread_name(num_threads, |_| String::new())
    }

    /// Creates a pool whose workers are named by `thread_name(index)`.
    /// An empty name leaves the thread unnamed.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0 or a worker thread cannot be started.
    pub fn with_thread_name(num_threads: usize, thread_name: impl Fn(usize) -> String) -> Self {
        assert_ne!(num_threads, 0);

        let (tx, rx) = mpsc::channel::<TaskFn>();
        let rx = Arc::new(Mutex::new(rx));
        for i in 0..num_threads {
            let rx = rx.clone();
            let mut builder = thread::Builder::new();
            let name = thread_name(i);
            if !name.is_empty() {
                builder = builder.name(name);
            }
            builder
                .spawn(move || Self::thread_fn(rx))
                .expect("spawn thread");
        }

        ThreadPool(tx)
    }

    /// Sets the size of the global pool. Only effective before the first call
    /// to [`global()`](Self::global).
    pub fn configure_global_pool_size(pool_size: usize) {
        GLOBAL_POOL_SIZE.store(pool_size.max(1), Ordering::SeqCst);
    }

    /// Returns the lazily created process-wide pool used for ivarator scans.
    pub fn global() -> &'static ThreadPool {
        static POOL: OnceLock<ThreadPool> = OnceLock::new();
        POOL.get_or_init(|| {
            ThreadPool::with_thread_name(Self::get_global_pool_size(), |i| {
                format!("quarry-scan-{i}")
            })
        })
    }

    /// Spawns `f` and returns a handle to its result.
    pub fn spawn<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx_result, rx_result) = oneshot::channel::<R>();
        self.spawn_detached(move || tx_result.send(f()));
        JoinHandle::new(rx_result)
    }

    /// Spawns `f` without a way to wait for it.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.0.send(Box::new(f)).is_err() {
            // The dropped task closes its result channel, so waiters see Canceled.
            log::error!("thread pool has no live workers, task dropped");
        }
    }

    fn get_global_pool_size() -> usize {
        let size = GLOBAL_POOL_SIZE.load(Ordering::SeqCst);
        if size == 0 {
            thread::available_parallelism()
                .map(|n| (n.get() * 3).div_ceil(2))
                .unwrap_or(8)
        } else {
            size
        }
    }

    fn thread_fn(rx: Arc<Mutex<Receiver<TaskFn>>>) {
        loop {
            let task = {
                let rx = rx.lock().unwrap_or_else(PoisonError::into_inner);
                rx.recv()
            };
            let Ok(task) = task else {
                return;
            };
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                log::error!("task panicked on worker {:?}", thread::current().name());
            }
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        let num_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        Self::new(num_threads)
    }
}

static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);
