// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Running handlers on a designated thread
//!
//! `on_executor` decorates a handler so that it runs somewhere other than the
//! executor of the promise it is attached to, e.g. an event loop thread that
//! owns some resource. The decorated handler still fits `then`/`catch` and
//! routes its outcome into the continuation through `Next::Chain`.
//!
//! ```no_run
//! use deferred::{Next, Promise};
//! use deferred::dispatch::{on_executor, DispatchThread};
//!
//! let ui = DispatchThread::spawn("ui").unwrap();
//! let ui_check = ui.clone();
//!
//! Promise::resolve(42)
//!     .then(on_executor(ui.clone(), move |value: i32| {
//!         assert!(ui_check.is_current());
//!         Ok(Next::Value(value + 1))
//!     }));
//! ```

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::Sender;

use crate::error::{reason, Reason};
use crate::promise::{Next, Promise};
use crate::scheduler::{run_task, Executor, Task};

/// Decorate `handler` to run on `executor`.
///
/// Works for resolve handlers as well as reject handlers (`I = Reason`).
pub fn on_executor<E, I, U, F>(executor: E, handler: F) -> impl FnOnce(I) -> Result<Next<U>, Reason> + Send + 'static
    where E: Executor + 'static,
          I: Send + 'static,
          U: Clone + Send + 'static,
          F: FnOnce(I) -> Result<Next<U>, Reason> + Send + 'static
{
    move |input| {
        let executor: Arc<dyn Executor> = Arc::new(executor);
        let relocated = Promise::<U>::with_executor(executor, move |settlement| {
            match handler(input)? {
                Next::Value(value) => settlement.resolve(value).map_err(reason),
                Next::Chain(promise) => {
                    settlement.follow(&promise);
                    Ok(())
                }
            }
        });

        Ok(Next::Chain(relocated))
    }
}

struct DispatchInner {
    name: String,
    id: ThreadId,
    sender: Mutex<Option<Sender<Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchInner {
    fn shutdown(&self) {
        // Closing the queue lets the thread drain what is left and exit
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if thread::current().id() == self.id {
                return;
            }
            if handle.join().is_err() {
                error!("Dispatch thread {} panicked", self.name);
            }
        }
    }
}

impl Drop for DispatchInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A single thread that runs submitted tasks one by one, in order.
///
/// Cloning gives another handle to the same thread. The thread exits after
/// `shutdown` or when the last handle is dropped.
#[derive(Clone)]
pub struct DispatchThread {
    inner: Arc<DispatchInner>,
}

impl DispatchThread {
    pub fn spawn<S: Into<String>>(name: S) -> io::Result<DispatchThread> {
        let name = name.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for task in receiver {
                    run_task(task);
                }
            })?;

        debug!("Dispatch thread {} started", name);

        Ok(DispatchThread {
            inner: Arc::new(DispatchInner {
                name,
                id: handle.thread().id(),
                sender: Mutex::new(Some(sender)),
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the caller runs on this dispatch thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.id
    }

    /// Stop accepting tasks and wait for the queued ones to finish
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Executor for DispatchThread {
    fn execute(&self, task: Task) {
        let sender = self.inner.sender.lock().unwrap_or_else(PoisonError::into_inner);

        let rejected = match *sender {
            Some(ref sender) => sender.send(task).is_err(),
            None => true,
        };

        if rejected {
            warn!("Dispatch thread {} is shut down, dropping task", self.inner.name);
        }
    }
}

impl fmt::Debug for DispatchThread {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DispatchThread").field("name", &self.inner.name).finish()
    }
}
