// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::error::{PromiseError, Reason};

use super::cores::ForwardCore;
use super::{Promise, Status};

/// The one-shot gate that settles a promise.
///
/// Handed to the work function of a promise. Only the first `resolve` or
/// `reject` takes effect; any later one fails with
/// `PromiseError::AlreadySettled`, except after the promise was cancelled,
/// where it is silently ignored.
pub struct Settlement<T> {
    promise: Promise<T>,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Settlement<T> {
        Settlement { promise: self.promise.clone() }
    }
}

impl<T> Settlement<T>
    where T: Clone + Send + 'static
{
    pub(crate) fn new(promise: Promise<T>) -> Settlement<T> {
        Settlement { promise }
    }

    pub(crate) fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    pub fn resolve(&self, value: T) -> Result<(), PromiseError> {
        self.promise.settle(Ok(value))
    }

    pub fn reject(&self, reason: Reason) -> Result<(), PromiseError> {
        self.promise.settle(Err(reason))
    }

    /// Reject with any error type
    pub fn reject_with<E>(&self, err: E) -> Result<(), PromiseError>
        where E: StdError + Send + Sync + 'static
    {
        self.reject(Arc::new(err))
    }

    /// Settle the same way `promise` eventually does
    pub fn follow(&self, promise: &Promise<T>) {
        promise.attach(Box::new(ForwardCore::new(self.promise.clone())));
    }

    /// Status of the promise being settled
    pub fn status(&self) -> Status {
        self.promise.status()
    }

    pub fn is_cancelled(&self) -> bool {
        self.promise.is_cancelled()
    }

    /// Whether the work function was asked to stop by `Promise::cancel(true)`
    pub fn is_interrupted(&self) -> bool {
        self.promise.task().map_or(false, |task| task.is_interrupted())
    }
}

impl<T> fmt::Debug for Settlement<T>
    where T: Clone + Send + 'static
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Settlement").field("promise", &self.promise).finish()
    }
}
