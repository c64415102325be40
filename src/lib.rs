// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! Promises backed by background work
//!
//! A `Promise` runs its work function on an `Executor` and settles exactly
//! once. Continuations registered with `then`, `catch` and friends are
//! dispatched through the executor as well, never on the registering thread.
//!
//! ```no_run
//! use deferred::{Next, Promise};
//!
//! let doubled = deferred::spawn(|| Ok(21))
//!     .then(|value: i32| Ok(Next::Value(value * 2)));
//!
//! assert_eq!(doubled.wait().unwrap(), 42);
//! ```

#[macro_use]
extern crate log;

pub use crate::combinators::{all, race};
pub use crate::error::{reason, AwaitError, PromiseError, Reason};
pub use crate::options::Options;
pub use crate::promise::{Interrupt, Next, Outcome, Promise, Settlement, Status};
pub use crate::scheduler::{default_executor, Executor, Inline, ThreadPool};

use std::sync::Arc;

pub mod combinators;
pub mod dispatch;
pub mod error;
pub mod options;
pub mod promise;
pub mod scheduler;
pub mod task;

/// Run `work` on the default executor and resolve with what it returns
#[inline]
pub fn spawn<F, T>(work: F) -> Promise<T>
    where F: FnOnce() -> Result<T, Reason> + Send + 'static,
          T: Clone + Send + 'static
{
    Builder::new().spawn(work)
}

/// Promise configuration. Provides control over the name and the executor of new promises.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    opts: Options,
}

impl Builder {
    /// Generates the base configuration, from which configuration methods can be chained.
    pub fn new() -> Builder {
        Builder { opts: Options::new() }
    }

    /// Names the promise-to-be. The name shows up in logs and `Debug` output only.
    #[inline]
    pub fn name(mut self, name: String) -> Builder {
        self.opts.name(name);
        self
    }

    /// Runs the work function and every handler on `executor`
    #[inline]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Builder {
        self.opts.executor(executor);
        self
    }

    /// Spawn `work`, resolving with its value or rejecting with its error
    pub fn spawn<F, T>(self, work: F) -> Promise<T>
        where F: FnOnce() -> Result<T, Reason> + Send + 'static,
              T: Clone + Send + 'static
    {
        Promise::with_options(self.opts, move |settlement| {
            let value = work()?;
            settlement.resolve(value).map_err(reason)
        })
    }

    /// A pending promise settled through the returned `Settlement`
    pub fn deferred<T>(self) -> (Promise<T>, Settlement<T>)
        where T: Clone + Send + 'static
    {
        Promise::deferred_with(self.opts)
    }

    /// An already resolved promise
    pub fn resolved<T>(self, value: T) -> Promise<T>
        where T: Clone + Send + 'static
    {
        Promise::settled_with(self.opts, Ok(value))
    }

    /// An already rejected promise
    pub fn rejected<T>(self, reason: Reason) -> Promise<T>
        where T: Clone + Send + 'static
    {
        Promise::settled_with(self.opts, Err(reason))
    }
}
