// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::AwaitError;
use crate::scheduler::Executor;

use super::super::Outcome;
use super::{Continuation, Link, Unlinked};

/// Something blocked that an `Interrupt` can wake up
pub(crate) trait Interruptible: Send + Sync {
    fn interrupt(&self);
}

struct WaitState<T> {
    outcome: Option<Outcome<T>>,
    cancelled: bool,
    interrupted: bool,
}

/// Parks a thread until the promise it is attached to settles
pub(crate) struct WaitCore<T> {
    state: Mutex<WaitState<T>>,
    settled: Condvar,
    // The waiter gave up; its entry may be pruned from the promise
    abandoned: AtomicBool,
}

impl<T> WaitCore<T>
    where T: Send + 'static
{
    pub fn new() -> Arc<WaitCore<T>> {
        Arc::new(WaitCore {
            state: Mutex::new(WaitState {
                outcome: None,
                cancelled: false,
                interrupted: false,
            }),
            settled: Condvar::new(),
            abandoned: AtomicBool::new(false),
        })
    }

    /// The entry to attach to the promise
    pub fn entry(self: &Arc<Self>) -> Box<dyn Continuation<T>> {
        Box::new(WaitEntry(self.clone()))
    }

    /// Block until settled, cancelled, interrupted, or past `deadline`.
    ///
    /// Every wake up re-checks the state, since condition variables may wake
    /// spuriously and the promise may have settled before we got here.
    /// Giving up on an unsettled promise marks the core abandoned.
    pub fn wait(&self, deadline: Option<Instant>) -> Result<T, AwaitError> {
        let result = self.block(deadline);
        if let Err(AwaitError::DeadlineExceeded) | Err(AwaitError::Interrupted) = result {
            self.abandoned.store(true, Ordering::Release);
        }
        result
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    fn block(&self, deadline: Option<Instant>) -> Result<T, AwaitError> {
        let mut state = self.lock();

        loop {
            if let Some(outcome) = state.outcome.take() {
                return outcome.map_err(AwaitError::Rejected);
            }
            if state.cancelled {
                return Err(AwaitError::Cancelled);
            }
            if state.interrupted {
                return Err(AwaitError::Interrupted);
            }

            state = match deadline {
                None => self.settled.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(AwaitError::DeadlineExceeded);
                    }

                    match self.settled.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
            };
        }
    }

    fn lock(&self) -> MutexGuard<WaitState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Interruptible for WaitCore<T>
    where T: Send + 'static
{
    fn interrupt(&self) {
        self.lock().interrupted = true;
        self.settled.notify_all();
    }
}

struct WaitEntry<T>(Arc<WaitCore<T>>);

impl<T> Continuation<T> for WaitEntry<T>
    where T: Send + 'static
{
    fn settle(self: Box<Self>, outcome: Outcome<T>, _: &Arc<dyn Executor>) {
        self.0.lock().outcome = Some(outcome);
        self.0.settled.notify_all();
    }

    fn cancel(self: Box<Self>, _: bool) -> Unlinked {
        self.0.lock().cancelled = true;
        self.0.settled.notify_all();
        Unlinked::leaf(true)
    }

    fn detach(self: Box<Self>) -> Vec<Box<dyn Link>> {
        Vec::new()
    }

    fn is_abandoned(&self) -> bool {
        self.0.is_abandoned()
    }
}
