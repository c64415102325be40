// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Task executors that run work functions and handlers

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// A unit of work submitted to an `Executor`
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run tasks.
///
/// Promises never run a work function or a handler on the thread that
/// registered it; they always go through an `Executor`.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) {
        (**self).execute(task)
    }
}

/// Default idle time before a pooled thread exits
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default thread name prefix of a `ThreadPool`
pub const DEFAULT_NAME_PREFIX: &str = "promise-worker";

/// Get the process-wide executor shared by every promise that was not given one
pub fn default_executor() -> Arc<dyn Executor> {
    static DEFAULT: OnceLock<Arc<dyn Executor>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(ThreadPool::new())).clone()
}

/// Runs every task right away on the submitting thread.
///
/// Useful for tests that need a deterministic order of execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) {
        run_task(task)
    }
}

pub(crate) fn run_task(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let message = crate::error::HandlerPanicked::from_payload(payload).message;
        error!("Task panicked outside of a promise: {}", message);
    }
}

/// Builder for a `ThreadPool`
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    name_prefix: String,
    keep_alive: Duration,
}

impl ThreadPoolBuilder {
    /// Prefix of the worker thread names, which are `<prefix>-<n>`
    pub fn name_prefix<S: Into<String>>(mut self, prefix: S) -> ThreadPoolBuilder {
        self.name_prefix = prefix.into();
        self
    }

    /// How long an idle worker waits for new work before it exits
    pub fn keep_alive(mut self, keep_alive: Duration) -> ThreadPoolBuilder {
        self.keep_alive = keep_alive;
        self
    }

    pub fn build(self) -> ThreadPool {
        let (sender, receiver) = crossbeam_channel::unbounded();

        ThreadPool {
            inner: Arc::new(PoolInner {
                sender,
                receiver,
                idle: AtomicUsize::new(0),
                workers: AtomicUsize::new(0),
                work_counts: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
                name_prefix: self.name_prefix,
                keep_alive: self.keep_alive,
            }),
        }
    }
}

impl Default for ThreadPoolBuilder {
    fn default() -> ThreadPoolBuilder {
        ThreadPoolBuilder {
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

struct PoolInner {
    sender: Sender<Task>,
    receiver: Receiver<Task>,

    // Workers blocked on the queue that no submitter has claimed yet
    idle: AtomicUsize,
    workers: AtomicUsize,
    work_counts: AtomicUsize,
    next_id: AtomicUsize,

    name_prefix: String,
    keep_alive: Duration,
}

/// A cached thread pool.
///
/// Idle threads are reused; when none is idle a new thread is spawned, so the
/// pool grows without bound under load and shrinks back after `keep_alive`.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Create a pool with default configurations
    pub fn new() -> ThreadPool {
        ThreadPool::builder().build()
    }

    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::default()
    }

    /// Tasks submitted but not yet finished
    #[inline]
    pub fn work_count(&self) -> usize {
        self.inner.work_counts.load(Ordering::SeqCst)
    }

    /// Threads currently alive in the pool
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.inner.workers.load(Ordering::SeqCst)
    }

    fn claim_idle(&self) -> bool {
        self.inner
            .idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn spawn_worker(&self, first: Task) {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}-{}", self.inner.name_prefix, id);
        let inner = self.inner.clone();

        // The first task is shared with the fallback path below
        let first = Arc::new(Mutex::new(Some(first)));
        let handed = first.clone();

        self.inner.workers.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let task = handed.lock().unwrap_or_else(PoisonError::into_inner).take();
                worker_loop(inner, task)
            });

        if let Err(err) = spawned {
            self.inner.workers.fetch_sub(1, Ordering::SeqCst);
            error!("Failed to spawn worker {}: {}; running task inline", name, err);

            let task = first.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(task) = task {
                run_task(task);
                self.inner.work_counts.fetch_sub(1, Ordering::SeqCst);
            }
        } else {
            debug!("Spawned worker {}", name);
        }
    }
}

impl Default for ThreadPool {
    fn default() -> ThreadPool {
        ThreadPool::new()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name_prefix", &self.inner.name_prefix)
            .field("workers", &self.worker_count())
            .field("work_count", &self.work_count())
            .finish()
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) {
        self.inner.work_counts.fetch_add(1, Ordering::SeqCst);

        if self.claim_idle() {
            // The pool owns a receiver, so the queue is never disconnected
            if let Err(err) = self.inner.sender.send(task) {
                run_task(err.into_inner());
                self.inner.work_counts.fetch_sub(1, Ordering::SeqCst);
            }
        } else {
            self.spawn_worker(task);
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>, first: Option<Task>) {
    let mut task = first;

    loop {
        if let Some(t) = task.take() {
            run_task(t);
            inner.work_counts.fetch_sub(1, Ordering::SeqCst);
            inner.idle.fetch_add(1, Ordering::SeqCst);
        }

        match inner.receiver.recv_timeout(inner.keep_alive) {
            Ok(t) => task = Some(t),
            Err(RecvTimeoutError::Timeout) => {
                let released = inner.idle
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if released {
                    break;
                }
                // Every idle slot was claimed, so a task is on its way to us
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    inner.workers.fetch_sub(1, Ordering::SeqCst);
    debug!("Worker {:?} is idle and exits", thread::current().name());
}
