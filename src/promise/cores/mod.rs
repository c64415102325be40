// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pending entries waiting for a promise to settle
//!
//! Every entry is consumed exactly once: either `settle` hands it the
//! outcome of its promise, or `cancel` tells it the promise was cancelled.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{HandlerPanicked, Reason};
use crate::scheduler::Executor;

use super::{Next, Outcome, Promise};

mod forward;
mod then;
mod wait;

pub(crate) use self::forward::ForwardCore;
pub(crate) use self::then::{Handlers, OnResolved, ThenCore};
pub(crate) use self::wait::{Interruptible, WaitCore};

/// The counterpart of `Promise::attach`
pub(crate) trait Continuation<T>: Send {
    /// The promise settled with `outcome`; `executor` is the one of that promise
    fn settle(self: Box<Self>, outcome: Outcome<T>, executor: &Arc<dyn Executor>);

    /// The promise was cancelled.
    ///
    /// Cancels the entry's own link only and hands back what was waiting on
    /// it, so a cascade never recurses.
    fn cancel(self: Box<Self>, may_interrupt: bool) -> Unlinked;

    /// The promise is going away unsettled; hand back the entries of a link
    /// nobody else holds so they are dropped one level at a time
    fn detach(self: Box<Self>) -> Vec<Box<dyn Link>>;

    /// Nobody will ever look at this entry's outcome
    fn is_abandoned(&self) -> bool {
        false
    }
}

/// A pending entry with its value type erased, so cancelling or dropping a
/// chain can walk links of any type with a plain work list
pub(crate) trait Link: Send {
    fn cancel_link(self: Box<Self>, may_interrupt: bool) -> Unlinked;

    fn detach_link(self: Box<Self>) -> Vec<Box<dyn Link>>;
}

impl<T: 'static> Link for Box<dyn Continuation<T>> {
    fn cancel_link(self: Box<Self>, may_interrupt: bool) -> Unlinked {
        Continuation::cancel(*self, may_interrupt)
    }

    fn detach_link(self: Box<Self>) -> Vec<Box<dyn Link>> {
        Continuation::detach(*self)
    }
}

/// One step of a cancel cascade
pub(crate) struct Unlinked {
    pub cancelled: bool,
    pub downstream: Vec<Box<dyn Link>>,
}

impl Unlinked {
    pub fn leaf(cancelled: bool) -> Unlinked {
        Unlinked {
            cancelled,
            downstream: Vec::new(),
        }
    }
}

pub(crate) fn links<T: 'static>(entries: Vec<Box<dyn Continuation<T>>>) -> Vec<Box<dyn Link>> {
    entries.into_iter().map(|entry| Box::new(entry) as Box<dyn Link>).collect()
}

/// Cancel every link reachable from `pending`; `true` if all of them were cancelled
pub(crate) fn cascade(mut pending: Vec<Box<dyn Link>>, may_interrupt: bool) -> bool {
    let mut cancelled = true;
    while let Some(link) = pending.pop() {
        let step = link.cancel_link(may_interrupt);
        cancelled &= step.cancelled;
        pending.extend(step.downstream);
    }
    cancelled
}

/// Drop every link reachable from `pending` without recursing
pub(crate) fn release(mut pending: Vec<Box<dyn Link>>) {
    while let Some(link) = pending.pop() {
        pending.extend(link.detach_link());
    }
}

/// Call a handler, turning a panic into a rejection
pub(crate) fn invoke<U, F>(handler: F) -> Result<Next<U>, Reason>
    where F: FnOnce() -> Result<Next<U>, Reason>
{
    match panic::catch_unwind(AssertUnwindSafe(handler)) {
        Ok(result) => result,
        Err(payload) => {
            let panicked = HandlerPanicked::from_payload(payload);
            warn!("Handler panicked: {}", panicked.message);
            Err(Arc::new(panicked))
        }
    }
}

/// Route what a handler returned into the continuation link `next`
pub(crate) fn forward<U>(next: Promise<U>, result: Result<Next<U>, Reason>)
    where U: Clone + Send + 'static
{
    match result {
        Ok(Next::Value(value)) => next.complete(Ok(value)),
        Ok(Next::Chain(promise)) => promise.attach(Box::new(ForwardCore::new(next))),
        Err(reason) => next.complete(Err(reason)),
    }
}
