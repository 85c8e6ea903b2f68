//! Sharded worker pool for background optimization
//!
//! Persistent workers, each draining its own bounded channel. A task is routed
//! to a shard by hashing its key, so every task for one key is handled by the
//! same worker in submission order. Tasks for different keys run in parallel
//! with no ordering between them.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        WorkerPool<T>                         │
//! │                                                              │
//! │  submit(key, task) ── hash(key) % N ──┐                      │
//! │                                       ▼                      │
//! │   ┌──────────────┐  ┌──────────────┐     ┌──────────────┐    │
//! │   │ Shard 0 (cap)│  │ Shard 1 (cap)│ ... │ Shard N (cap)│    │
//! │   └──────┬───────┘  └──────┬───────┘     └──────┬───────┘    │
//! │          ▼                 ▼                    ▼            │
//! │     ┌──────────┐      ┌──────────┐         ┌──────────┐      │
//! │     │ Worker 0 │      │ Worker 1 │         │ Worker N │      │
//! │     └──────────┘      └──────────┘         └──────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers block on `recv()` and stay alive until the pool is dropped.
//! `submit` blocks only while the target shard is full. A panicking task is
//! logged and the worker moves on to the next one.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

type Handler<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// Count of submitted tasks not yet finished
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// A persistent pool of workers with key-sharded queues
pub struct WorkerPool<T: Send + 'static> {
    senders: Vec<Sender<T>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
    shard_capacity: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool of `num_threads` workers running `handler`
    ///
    /// `queue_capacity` is the total across all shards; each shard holds at
    /// least one task. Workers are spawned immediately.
    pub fn new<F>(name: &str, num_threads: usize, queue_capacity: usize, handler: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let num_threads = num_threads.max(1);
        let shard_capacity = (queue_capacity / num_threads).max(1);
        let handler: Handler<T> = Arc::new(handler);
        let pending = Arc::new(Pending::default());

        let (senders, workers): (Vec<_>, Vec<_>) = (0..num_threads)
            .map(|id| {
                let (sender, receiver) = bounded::<T>(shard_capacity);
                let handler = Arc::clone(&handler);
                let pending = Arc::clone(&pending);
                let worker = thread::Builder::new()
                    .name(format!("{}-{}", name, id))
                    .spawn(move || worker_loop(id, receiver, handler, pending))
                    .expect("failed to spawn optimization worker thread");
                (sender, worker)
            })
            .unzip();

        debug!(
            target: "opfusion::pool",
            name,
            workers = num_threads,
            shard_capacity,
            "worker pool started"
        );

        Self {
            senders,
            workers,
            pending,
            shard_capacity,
        }
    }

    /// Get the number of worker threads in the pool
    pub fn num_threads(&self) -> usize {
        self.senders.len()
    }

    /// Capacity of each worker's queue
    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity
    }

    /// Shard that tasks for `key` are routed to
    pub fn shard_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue `task` on the shard owning `key`
    ///
    /// Blocks while that shard is full. Fails only if the shard's worker has
    /// exited.
    pub fn submit<K: Hash + ?Sized>(&self, key: &K, task: T) -> Result<(), PoolClosed> {
        let shard = self.shard_for(key);
        self.pending.begin();
        match self.senders[shard].send(task) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.pending.finish();
                Err(PoolClosed)
            }
        }
    }

    /// Number of tasks queued or running
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Block until every submitted task has finished or `timeout` elapses
    ///
    /// Returns true if the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self
                .pending
                .idle
                .wait_until(&mut count, deadline)
                .timed_out()
            {
                return *count == 0;
            }
        }
        true
    }

    /// Shut down the pool, letting workers drain their queues first
    pub fn shutdown(self) {
        drop(self);
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        // Closing every channel ends the worker loops once queues drain
        self.senders.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Worker thread main loop
fn worker_loop<T: Send + 'static>(
    id: usize,
    receiver: Receiver<T>,
    handler: Handler<T>,
    pending: Arc<Pending>,
) {
    while let Ok(task) = receiver.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(task))) {
            error!(
                target: "opfusion::pool",
                worker = id,
                panic = panic_message(payload.as_ref()),
                "optimization task panicked"
            );
        }
        pending.finish();
    }
    debug!(target: "opfusion::pool", worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Error returned when submitting to a pool whose worker has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker pool has been shut down")
    }
}

impl std::error::Error for PoolClosed {}
