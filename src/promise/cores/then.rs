// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::Arc;

use crate::error::Reason;
use crate::scheduler::Executor;

use super::super::{Next, Outcome, Promise};
use super::{forward, invoke, Continuation, Link, Unlinked};

pub(crate) type ResolveFn<T, U> = Box<dyn FnOnce(T) -> Result<Next<U>, Reason> + Send>;
pub(crate) type RejectFn<U> = Box<dyn FnOnce(Reason) -> Result<Next<U>, Reason> + Send>;
pub(crate) type SettledFn<T, U> = Box<dyn FnOnce(Outcome<T>) -> Result<Next<U>, Reason> + Send>;

pub(crate) enum OnResolved<T, U> {
    Handler(ResolveFn<T, U>),
    // `catch` lets a resolved value through untouched
    Forward(fn(T) -> U),
}

pub(crate) enum Handlers<T, U> {
    Split {
        on_resolved: OnResolved<T, U>,
        // None passes the rejection on to `next`
        on_rejected: Option<RejectFn<U>>,
    },
    Settled(SettledFn<T, U>),
}

/// A continuation created by `then`/`catch`.
///
/// Whatever the handlers do runs on the executor, never on the thread that
/// settled the promise or registered the handlers.
pub(crate) struct ThenCore<T, U> {
    next: Promise<U>,
    handlers: Handlers<T, U>,
}

impl<T, U> ThenCore<T, U>
    where T: Clone + Send + 'static,
          U: Clone + Send + 'static
{
    pub fn new(next: Promise<U>, handlers: Handlers<T, U>) -> ThenCore<T, U> {
        ThenCore { next, handlers }
    }
}

impl<T, U> Continuation<T> for ThenCore<T, U>
    where T: Clone + Send + 'static,
          U: Clone + Send + 'static
{
    fn settle(self: Box<Self>, outcome: Outcome<T>, executor: &Arc<dyn Executor>) {
        let ThenCore { next, handlers } = *self;

        match (handlers, outcome) {
            (Handlers::Split { on_resolved: OnResolved::Handler(handler), .. }, Ok(value)) => {
                executor.execute(Box::new(move || forward(next, invoke(move || handler(value)))));
            }
            (Handlers::Split { on_resolved: OnResolved::Forward(map), .. }, Ok(value)) => {
                executor.execute(Box::new(move || next.complete(Ok(map(value)))));
            }
            (Handlers::Split { on_rejected: Some(handler), .. }, Err(reason)) => {
                executor.execute(Box::new(move || forward(next, invoke(move || handler(reason)))));
            }
            (Handlers::Split { on_rejected: None, .. }, Err(reason)) => {
                executor.execute(Box::new(move || next.complete(Err(reason))));
            }
            (Handlers::Settled(handler), outcome) => {
                executor.execute(Box::new(move || forward(next, invoke(move || handler(outcome)))));
            }
        }
    }

    fn cancel(self: Box<Self>, may_interrupt: bool) -> Unlinked {
        self.next.unlink(may_interrupt)
    }

    fn detach(self: Box<Self>) -> Vec<Box<dyn Link>> {
        self.next.detach()
    }
}
