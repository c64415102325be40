// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Cancellable handle for the background work of a promise

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::scheduler::Task;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

#[derive(Debug)]
struct TaskState {
    state: AtomicU8,
    interrupted: AtomicBool,
}

/// Shared view of a submitted task.
///
/// Cancellation is cooperative: a queued task never starts, a running task
/// only sees its interrupt flag raised.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    inner: Arc<TaskState>,
}

impl TaskHandle {
    pub fn new() -> TaskHandle {
        TaskHandle {
            inner: Arc::new(TaskState {
                state: AtomicU8::new(QUEUED),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Wrap `f` so that it honors this handle once submitted to an executor
    pub fn wrap<F>(&self, f: F) -> Task
        where F: FnOnce() + Send + 'static
    {
        let handle = self.clone();
        Box::new(move || {
            if handle.inner
                .state
                .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err() {
                debug!("Task was cancelled before it started");
                return;
            }

            f();

            // A running task that got cancelled stays cancelled
            let _ = handle.inner
                .state
                .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire);
        })
    }

    /// Attempt to cancel the task.
    ///
    /// Fails only if the task has already run to completion.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let mut current = self.inner.state.load(Ordering::Acquire);

        loop {
            match current {
                DONE => return false,
                CANCELLED => return true,
                _ => {}
            }

            match self.inner
                .state
                .compare_exchange(current, CANCELLED, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if current == RUNNING && may_interrupt {
            self.inner.interrupted.store(true, Ordering::Release);
        }

        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == DONE
    }

    /// Whether the running task has been asked to stop
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }
}

impl Default for TaskHandle {
    fn default() -> TaskHandle {
        TaskHandle::new()
    }
}
