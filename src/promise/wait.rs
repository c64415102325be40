// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Blocking on a promise from threads that cannot continue it
//!
//! Waiting never cancels the promise. When a deadline passes the promise
//! keeps running and can still be continued or waited on again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use slab::Slab;

use crate::error::AwaitError;

use super::cores::{Interruptible, WaitCore};
use super::Promise;

/// Block until `promise` settles, ignoring interrupts
pub fn wait<T>(promise: &Promise<T>) -> Result<T, AwaitError>
    where T: Clone + Send + 'static
{
    block(promise, &WaitCore::new(), None)
}

/// Block until `promise` settles or `interrupt` is triggered
pub fn wait_interruptibly<T>(promise: &Promise<T>, interrupt: &Interrupt) -> Result<T, AwaitError>
    where T: Clone + Send + 'static
{
    let core = WaitCore::new();
    let _registration = interrupt.register(&core);
    block(promise, &core, None)
}

/// Block for at most `timeout`
pub fn wait_timeout<T>(promise: &Promise<T>, timeout: Duration) -> Result<T, AwaitError>
    where T: Clone + Send + 'static
{
    match Instant::now().checked_add(timeout) {
        Some(deadline) => wait_deadline(promise, deadline),
        // Too far out to represent
        None => wait(promise),
    }
}

/// Block until `deadline` at the latest
pub fn wait_deadline<T>(promise: &Promise<T>, deadline: Instant) -> Result<T, AwaitError>
    where T: Clone + Send + 'static
{
    block(promise, &WaitCore::new(), Some(deadline))
}

fn block<T>(promise: &Promise<T>, core: &Arc<WaitCore<T>>, deadline: Option<Instant>) -> Result<T, AwaitError>
    where T: Clone + Send + 'static
{
    promise.attach(core.entry());
    let result = core.wait(deadline);

    // A waiter that gave up must not stay queued until the promise settles
    if core.is_abandoned() {
        promise.prune();
    }
    result
}

struct InterruptInner {
    interrupted: AtomicBool,
    waiters: Mutex<Slab<Weak<dyn Interruptible>>>,
}

/// Wakes up threads blocked in `wait_interruptibly`.
///
/// The flag is sticky: once triggered, every later interruptible wait with
/// this token fails right away until `reset` is called.
#[derive(Clone)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

impl Interrupt {
    pub fn new() -> Interrupt {
        Interrupt {
            inner: Arc::new(InterruptInner {
                interrupted: AtomicBool::new(false),
                waiters: Mutex::new(Slab::new()),
            }),
        }
    }

    /// Interrupt every thread currently waiting with this token
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);

        let waiters: Vec<_> = self.waiters().iter().filter_map(|(_, w)| w.upgrade()).collect();
        debug!("Interrupting {} waiter(s)", waiters.len());

        for waiter in waiters {
            waiter.interrupt();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Clear the flag
    pub fn reset(&self) {
        self.inner.interrupted.store(false, Ordering::SeqCst);
    }

    fn register<T>(&self, core: &Arc<WaitCore<T>>) -> Registration
        where T: Send + 'static
    {
        let weak: Weak<dyn Interruptible> = Arc::downgrade(core) as Weak<dyn Interruptible>;
        let key = self.waiters().insert(weak);

        // Raised before we were listed
        if self.is_interrupted() {
            core.interrupt();
        }

        Registration {
            interrupt: self.clone(),
            key,
        }
    }

    fn waiters(&self) -> MutexGuard<Slab<Weak<dyn Interruptible>>> {
        self.inner.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Interrupt {
    fn default() -> Interrupt {
        Interrupt::new()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

struct Registration {
    interrupt: Interrupt,
    key: usize,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut waiters = self.interrupt.waiters();
        if waiters.contains(self.key) {
            waiters.remove(self.key);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::thread;

    #[test]
    fn test_wait_on_settled_promise() {
        assert_eq!(wait(&Promise::resolve(3)).unwrap(), 3);
    }

    #[test]
    fn test_wait_deadline_in_the_past() {
        let (p, _settlement) = Promise::<i32>::deferred();
        match wait_deadline(&p, Instant::now()) {
            Err(AwaitError::DeadlineExceeded) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(p.is_pending());
    }

    #[test]
    fn test_interrupt_before_wait_fails_fast() {
        let (p, _settlement) = Promise::<i32>::deferred();
        let interrupt = Interrupt::new();
        interrupt.interrupt();

        match wait_interruptibly(&p, &interrupt) {
            Err(AwaitError::Interrupted) => {}
            other => panic!("unexpected {:?}", other),
        }

        interrupt.reset();
        assert!(!interrupt.is_interrupted());
    }

    #[test]
    fn test_interrupt_wakes_waiter() {
        let (p, _settlement) = Promise::<i32>::deferred();
        let interrupt = Interrupt::new();

        let waiter = {
            let interrupt = interrupt.clone();
            thread::spawn(move || wait_interruptibly(&p, &interrupt))
        };

        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();

        match waiter.join().unwrap() {
            Err(AwaitError::Interrupted) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(interrupt.waiters().is_empty());
    }

    #[test]
    fn test_uninterruptible_wait_ignores_interrupt() {
        let (p, settlement) = Promise::<i32>::deferred();
        let interrupt = Interrupt::new();

        let waiter = thread::spawn(move || wait(&p));

        thread::sleep(Duration::from_millis(20));
        interrupt.interrupt();
        thread::sleep(Duration::from_millis(20));
        settlement.resolve(9).unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), 9);
    }

    #[test]
    fn test_timed_out_waits_leave_no_entries() {
        let (p, settlement) = Promise::<i32>::deferred();

        for _ in 0..1000 {
            match wait_timeout(&p, Duration::from_millis(0)) {
                Err(AwaitError::DeadlineExceeded) => {}
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(p.pending_entries(), 0);

        settlement.resolve(4).unwrap();
        assert_eq!(wait(&p).unwrap(), 4);
    }

    #[test]
    fn test_interrupted_wait_leaves_no_entry() {
        let (p, _settlement) = Promise::<i32>::deferred();
        let interrupt = Interrupt::new();
        interrupt.interrupt();

        for _ in 0..10 {
            assert!(wait_interruptibly(&p, &interrupt).is_err());
        }
        assert_eq!(p.pending_entries(), 0);
    }

    #[test]
    fn test_live_waiter_survives_pruning() {
        let (p, settlement) = Promise::<i32>::deferred();
        let waiting = p.clone();
        let waiter = thread::spawn(move || wait(&waiting));

        while p.pending_entries() == 0 {
            thread::yield_now();
        }
        assert!(wait_timeout(&p, Duration::from_millis(1)).is_err());
        assert_eq!(p.pending_entries(), 1);

        settlement.resolve(8).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), 8);
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let (p, _settlement) = Promise::<i32>::deferred();
        let waiting = p.clone();
        let waiter = thread::spawn(move || wait(&waiting));

        thread::sleep(Duration::from_millis(20));
        assert!(p.cancel(true));

        match waiter.join().unwrap() {
            Err(AwaitError::Cancelled) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
