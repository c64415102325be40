// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::Arc;

use crate::scheduler::Executor;

use super::super::{Outcome, Promise};
use super::{Continuation, Link, Unlinked};

/// Settles `next` exactly like the promise it is attached to
pub(crate) struct ForwardCore<T> {
    next: Promise<T>,
}

impl<T> ForwardCore<T>
    where T: Clone + Send + 'static
{
    pub fn new(next: Promise<T>) -> ForwardCore<T> {
        ForwardCore { next }
    }
}

impl<T> Continuation<T> for ForwardCore<T>
    where T: Clone + Send + 'static
{
    fn settle(self: Box<Self>, outcome: Outcome<T>, executor: &Arc<dyn Executor>) {
        let next = self.next;
        executor.execute(Box::new(move || next.complete(outcome)));
    }

    fn cancel(self: Box<Self>, may_interrupt: bool) -> Unlinked {
        self.next.unlink(may_interrupt)
    }

    fn detach(self: Box<Self>) -> Vec<Box<dyn Link>> {
        self.next.detach()
    }
}
