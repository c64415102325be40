// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

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
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE

//! Promise style asynchronous APIs
//!
//! Most parts of this module use a certain pattern to describe template parameters:
//!
//! T => The resolved value of the current promise
//! U => The resolved value of the continuation created with `.then()` or `.catch()`

mod cores;
mod next;
mod settlement;
pub mod wait;

pub use self::next::Next;
pub use self::settlement::Settlement;
pub use self::wait::Interrupt;

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::combinators;
use crate::error::{AwaitError, HandlerPanicked, PromiseError, Reason};
use crate::options::Options;
use crate::scheduler::{default_executor, Executor};
use crate::task::TaskHandle;

use self::cores::{cascade, links, release, Continuation, Handlers, Link, OnResolved, ThenCore, Unlinked};

/// The outcome a promise settles with
pub type Outcome<T> = Result<T, Reason>;

/// Where a promise is in its life cycle.
///
/// `Pending` is the only state that can change; the others are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

// Status, payload and the continuations waiting for them form one unit, so
// registering a continuation can never interleave with settling.
enum State<T> {
    Pending(Vec<Box<dyn Continuation<T>>>),
    Resolved(T),
    Rejected(Reason),
    Cancelled,
}

impl<T> State<T> {
    fn status(&self) -> Status {
        match *self {
            State::Pending(..) => Status::Pending,
            State::Resolved(..) => Status::Resolved,
            State::Rejected(..) => Status::Rejected,
            State::Cancelled => Status::Cancelled,
        }
    }
}

struct Inner<T> {
    name: Option<String>,
    executor: Arc<dyn Executor>,
    task: Option<TaskHandle>,
    state: Mutex<State<T>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // An unsettled chain owns its links; unlink them level by level
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Pending(ref mut entries) = *state {
            let mut detached = Vec::new();
            for entry in entries.drain(..) {
                detached.extend(entry.detach());
            }
            release(detached);
        }
    }
}

/// A value that may not exist yet.
///
/// A promise is produced by a work function running on an `Executor`, and
/// settles exactly once: it is either resolved with a value or rejected with
/// a `Reason`, unless it is cancelled first. Cloning a `Promise` clones the
/// handle, not the result.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Promise<T> {
        Promise { inner: self.inner.clone() }
    }
}

impl<T> Promise<T>
    where T: Clone + Send + 'static
{
    /// Run `work` on the default executor; it settles the returned promise.
    ///
    /// An `Err` returned from `work`, or a panic inside it, rejects the promise.
    pub fn new<F>(work: F) -> Promise<T>
        where F: FnOnce(Settlement<T>) -> Result<(), Reason> + Send + 'static
    {
        Promise::with_options(Options::default(), work)
    }

    /// Run `work` on `executor`
    pub fn with_executor<F>(executor: Arc<dyn Executor>, work: F) -> Promise<T>
        where F: FnOnce(Settlement<T>) -> Result<(), Reason> + Send + 'static
    {
        let mut opts = Options::new();
        opts.executor(executor);
        Promise::with_options(opts, work)
    }

    /// Run `work` with options
    pub fn with_options<F>(opts: Options, work: F) -> Promise<T>
        where F: FnOnce(Settlement<T>) -> Result<(), Reason> + Send + 'static
    {
        let Options { name, executor } = opts;
        let executor = executor.unwrap_or_else(default_executor);
        let task = TaskHandle::new();

        let promise = Promise::from_state(name, executor, Some(task.clone()), State::Pending(Vec::new()));
        let settlement = Settlement::new(promise.clone());

        promise.inner.executor.execute(task.wrap(move || run_work(settlement, work)));
        promise
    }

    /// A pending promise without background work, settled through the returned `Settlement`
    pub fn deferred() -> (Promise<T>, Settlement<T>) {
        Promise::deferred_with(Options::default())
    }

    pub(crate) fn deferred_with(opts: Options) -> (Promise<T>, Settlement<T>) {
        let executor = opts.executor.unwrap_or_else(default_executor);
        let promise = Promise::from_state(opts.name, executor, None, State::Pending(Vec::new()));
        let settlement = Settlement::new(promise.clone());
        (promise, settlement)
    }

    /// A promise that is already resolved with `value`
    pub fn resolve(value: T) -> Promise<T> {
        Promise::settled_with(Options::default(), Ok(value))
    }

    /// A promise that is already rejected with `reason`
    pub fn reject(reason: Reason) -> Promise<T> {
        Promise::settled_with(Options::default(), Err(reason))
    }

    pub(crate) fn settled_with(opts: Options, outcome: Outcome<T>) -> Promise<T> {
        let executor = opts.executor.unwrap_or_else(default_executor);
        let state = match outcome {
            Ok(value) => State::Resolved(value),
            Err(reason) => State::Rejected(reason),
        };
        Promise::from_state(opts.name, executor, None, state)
    }

    fn from_state(name: Option<String>,
                  executor: Arc<dyn Executor>,
                  task: Option<TaskHandle>,
                  state: State<T>)
                  -> Promise<T> {
        Promise {
            inner: Arc::new(Inner {
                name,
                executor,
                task,
                state: Mutex::new(state),
            }),
        }
    }

    /// Wait for every promise to resolve, see `combinators::all`
    pub fn all(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
        combinators::all(promises)
    }

    /// Settle like the first promise to settle, see `combinators::race`
    pub fn race(promises: Vec<Promise<T>>) -> Promise<Option<T>> {
        combinators::race(promises)
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.inner.executor
    }

    pub fn status(&self) -> Status {
        self.lock().status()
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.status() == Status::Resolved
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        self.status() == Status::Rejected
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status() == Status::Cancelled
    }

    /// Cancel a pending promise and every continuation waiting on it.
    ///
    /// Returns `true` only if this promise and all of its continuations were
    /// cancelled. A promise whose work has already finished cannot be
    /// cancelled; a running work function only has its interrupt flag raised
    /// when `may_interrupt` is set.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        match self.cancel_local(may_interrupt) {
            Some(entries) => cascade(links(entries), may_interrupt),
            None => false,
        }
    }

    /// Continue with `on_resolved` once this promise resolves.
    ///
    /// A rejection skips the handler and rejects the returned promise with
    /// the same reason.
    pub fn then<U, F>(&self, on_resolved: F) -> Promise<U>
        where U: Clone + Send + 'static,
              F: FnOnce(T) -> Result<Next<U>, Reason> + Send + 'static
    {
        self.chain(Handlers::Split {
            on_resolved: OnResolved::Handler(Box::new(on_resolved)),
            on_rejected: None,
        })
    }

    /// Continue with `on_resolved` or `on_rejected`, depending on how this promise settles
    pub fn then_or<U, F, R>(&self, on_resolved: F, on_rejected: R) -> Promise<U>
        where U: Clone + Send + 'static,
              F: FnOnce(T) -> Result<Next<U>, Reason> + Send + 'static,
              R: FnOnce(Reason) -> Result<Next<U>, Reason> + Send + 'static
    {
        self.chain(Handlers::Split {
            on_resolved: OnResolved::Handler(Box::new(on_resolved)),
            on_rejected: Some(Box::new(on_rejected)),
        })
    }

    /// Handle a rejection; a resolved value passes through unchanged
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T>
        where R: FnOnce(Reason) -> Result<Next<T>, Reason> + Send + 'static
    {
        self.chain(Handlers::Split {
            on_resolved: OnResolved::Forward(std::convert::identity),
            on_rejected: Some(Box::new(on_rejected)),
        })
    }

    /// Run `f` however this promise settles, then pass the outcome on
    pub fn always<F>(&self, f: F) -> Promise<T>
        where F: FnOnce() + Send + 'static
    {
        self.chain(Handlers::Settled(Box::new(move |outcome: Outcome<T>| {
            f();
            outcome.map(Next::Value)
        })))
    }

    /// Swallow any rejection, resolving with `None` instead
    pub fn ignore_reason(&self) -> Promise<Option<T>> {
        self.then_or(|value| Ok(Next::Value(Some(value))),
                     |reason| {
                         debug!("Ignoring rejection: {}", reason);
                         Ok(Next::Value(None))
                     })
    }

    /// Block until the promise settles.
    ///
    /// Returns the resolved value, or the original reason of a rejection.
    pub fn wait(&self) -> Result<T, AwaitError> {
        wait::wait(self)
    }

    /// Block until the promise settles or `interrupt` is triggered
    pub fn wait_interruptibly(&self, interrupt: &Interrupt) -> Result<T, AwaitError> {
        wait::wait_interruptibly(self, interrupt)
    }

    /// Block for at most `timeout`; the promise keeps running if it elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, AwaitError> {
        wait::wait_timeout(self, timeout)
    }

    /// Block until `deadline` at the latest; the promise keeps running if it passes
    pub fn wait_deadline(&self, deadline: Instant) -> Result<T, AwaitError> {
        wait::wait_deadline(self, deadline)
    }

    fn chain<U>(&self, handlers: Handlers<T, U>) -> Promise<U>
        where U: Clone + Send + 'static
    {
        let next = self.link();
        self.attach(Box::new(ThenCore::new(next.clone(), handlers)));
        next
    }

    /// A fresh pending continuation sharing this promise's executor
    pub(crate) fn link<U>(&self) -> Promise<U>
        where U: Clone + Send + 'static
    {
        Promise::from_state(None, self.inner.executor.clone(), None, State::Pending(Vec::new()))
    }

    /// Cancel this promise alone, handing back the entries that waited on it
    fn cancel_local(&self, may_interrupt: bool) -> Option<Vec<Box<dyn Continuation<T>>>> {
        let entries = {
            let mut state = self.lock();
            let entries = match *state {
                State::Pending(ref mut entries) => entries,
                _ => return None,
            };

            if let Some(ref task) = self.inner.task {
                if !task.cancel(may_interrupt) {
                    return None;
                }
            }

            let entries = mem::take(entries);
            *state = State::Cancelled;
            entries
        };

        debug!("Promise {:?} cancelled with {} continuation(s)", self.name(), entries.len());
        Some(entries)
    }

    /// One step of a cancel cascade reaching this promise as a continuation link
    pub(crate) fn unlink(&self, may_interrupt: bool) -> Unlinked {
        match self.cancel_local(may_interrupt) {
            Some(entries) => Unlinked {
                cancelled: true,
                downstream: links(entries),
            },
            None => Unlinked::leaf(false),
        }
    }

    /// Give up this handle; if it was the last one, take the pending entries
    /// out so that dropping the promise stays shallow
    pub(crate) fn detach(mut self) -> Vec<Box<dyn Link>> {
        let inner = match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner,
            None => return Vec::new(),
        };

        match *inner.state.get_mut().unwrap_or_else(PoisonError::into_inner) {
            State::Pending(ref mut entries) => links(mem::take(entries)),
            _ => Vec::new(),
        }
    }

    /// Drop entries whose waiter gave up
    pub(crate) fn prune(&self) {
        let mut state = self.lock();
        if let State::Pending(ref mut entries) = *state {
            entries.retain(|entry| !entry.is_abandoned());
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_entries(&self) -> usize {
        match *self.lock() {
            State::Pending(ref entries) => entries.len(),
            _ => 0,
        }
    }

    /// Register `entry` to be settled with this promise's outcome.
    ///
    /// Runs right away if the promise has already settled.
    pub(crate) fn attach(&self, entry: Box<dyn Continuation<T>>) {
        let outcome = {
            let mut state = self.lock();
            match *state {
                State::Pending(ref mut entries) => {
                    entries.push(entry);
                    return;
                }
                State::Resolved(ref value) => Some(Ok(value.clone())),
                State::Rejected(ref reason) => Some(Err(reason.clone())),
                State::Cancelled => None,
            }
        };

        match outcome {
            Some(outcome) => entry.settle(outcome, &self.inner.executor),
            None => {
                cascade(links(vec![entry]), true);
            }
        }
    }

    /// Settle the promise and hand the outcome to every waiting continuation.
    ///
    /// Settling a cancelled promise is silently ignored.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> Result<(), PromiseError> {
        let entries = {
            let mut state = self.lock();
            let entries = match *state {
                State::Pending(ref mut entries) => mem::take(entries),
                State::Cancelled => {
                    debug!("Promise {:?} was cancelled, dropping its settlement", self.name());
                    return Ok(());
                }
                ref settled => return Err(PromiseError::AlreadySettled { status: settled.status() }),
            };

            *state = match outcome {
                Ok(ref value) => State::Resolved(value.clone()),
                Err(ref reason) => State::Rejected(reason.clone()),
            };
            entries
        };

        trace!("Promise {:?} settled, dispatching {} continuation(s)", self.name(), entries.len());

        for entry in entries {
            entry.settle(outcome.clone(), &self.inner.executor);
        }

        Ok(())
    }

    /// Settle a continuation link, which only its upstream ever settles
    pub(crate) fn complete(&self, outcome: Outcome<T>) {
        if let Err(err) = self.settle(outcome) {
            error!("Continuation {:?} settled twice: {}", self.name(), err);
        }
    }

    pub(crate) fn task(&self) -> Option<&TaskHandle> {
        self.inner.task.as_ref()
    }

    fn lock(&self) -> MutexGuard<State<T>> {
        // Handlers never run under this lock, so a poisoned lock still holds a consistent state
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for Promise<T>
    where T: Clone + Send + 'static
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Promise")
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

fn run_work<T, F>(settlement: Settlement<T>, work: F)
    where T: Clone + Send + 'static,
          F: FnOnce(Settlement<T>) -> Result<(), Reason> + Send + 'static
{
    let promise = settlement.promise().clone();

    let reason = match panic::catch_unwind(AssertUnwindSafe(move || work(settlement))) {
        Ok(Ok(())) => return,
        Ok(Err(reason)) => reason,
        Err(payload) => {
            let panicked = HandlerPanicked::from_payload(payload);
            warn!("Work function of promise {:?} panicked: {}", promise.name(), panicked.message);
            Arc::new(panicked) as Reason
        }
    };

    if let Err(err) = promise.settle(Err(reason.clone())) {
        warn!("Work function of promise {:?} failed after settling ({}): {}", promise.name(), err, reason);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::mpsc;

    use crate::error::reason;
    use crate::scheduler::Inline;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    fn inline() -> Options {
        let mut opts = Options::new();
        opts.executor(Arc::new(Inline));
        opts
    }

    fn resolved<T: Clone + Send + 'static>(value: T) -> Promise<T> {
        Promise::settled_with(inline(), Ok(value))
    }

    fn rejected<T: Clone + Send + 'static>(msg: &'static str) -> Promise<T> {
        Promise::settled_with(inline(), Err(reason(TestError(msg))))
    }

    #[test]
    fn test_resolve_factory_is_resolved() {
        let p = Promise::resolve(5);
        assert_eq!(p.status(), Status::Resolved);
        assert!(p.is_resolved());
        assert!(!p.is_pending());
    }

    #[test]
    fn test_reject_factory_is_rejected() {
        let p = Promise::<i32>::reject(reason(TestError("nope")));
        assert!(p.is_rejected());
    }

    #[test]
    fn test_then_transforms_value() {
        let (tx, rx) = mpsc::channel();

        resolved(5)
            .then(|v| Ok(Next::Value(v * 2)))
            .then(move |v| {
                tx.send(v).unwrap();
                Ok(Next::done())
            });

        assert_eq!(rx.try_recv().unwrap(), 10);
    }

    #[test]
    fn test_then_flattens_returned_promise() {
        let (tx, rx) = mpsc::channel();

        resolved(1)
            .then(|v| Ok(Next::Chain(resolved(format!("v{}", v)))))
            .then(move |s| {
                tx.send(s).unwrap();
                Ok(Next::done())
            });

        assert_eq!(rx.try_recv().unwrap(), "v1");
    }

    #[test]
    fn test_flattening_waits_for_inner_promise() {
        let (inner, settlement) = Promise::<i32>::deferred_with(inline());
        let next = resolved(0).then(move |_| Ok(Next::Chain(inner)));

        assert!(next.is_pending());
        settlement.resolve(7).unwrap();
        assert_eq!(next.wait().unwrap(), 7);
    }

    #[test]
    fn test_rejection_skips_resolve_handlers() {
        let (tx, rx) = mpsc::channel();
        let skipped = tx.clone();

        rejected::<i32>("GREAT")
            .then(move |v| {
                skipped.send(format!("resolved {}", v)).unwrap();
                Ok(Next::Value(v))
            })
            .then(|v| Ok(Next::Value(v + 1)))
            .catch(move |reason| {
                tx.send(reason.to_string()).unwrap();
                Ok(Next::Value(0))
            });

        assert_eq!(rx.try_recv().unwrap(), "GREAT");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_at_first_catch() {
        let (tx, rx) = mpsc::channel();
        let second = tx.clone();

        rejected::<i32>("GREAT")
            .catch(move |reason| {
                tx.send(format!("first {}", reason)).unwrap();
                Ok(Next::Value(1))
            })
            .catch(move |reason| {
                second.send(format!("second {}", reason)).unwrap();
                Ok(Next::Value(2))
            });

        assert_eq!(rx.try_recv().unwrap(), "first GREAT");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_catch_passes_value_through() {
        let p = resolved(50).catch(|_| Ok(Next::Value(0)));
        assert_eq!(p.wait().unwrap(), 50);
    }

    #[test]
    fn test_then_after_catch_gets_recovered_value() {
        let p = rejected::<i32>("x").catch(|_| Ok(Next::Chain(resolved(10)))).then(|v| Ok(Next::Value(v + 1)));
        assert_eq!(p.wait().unwrap(), 11);
    }

    #[test]
    fn test_handler_error_rejects_link() {
        let cause = reason(TestError("handler"));
        let thrown = cause.clone();

        let p = resolved(1).then(move |_| -> Result<Next<i32>, Reason> { Err(thrown) });

        let err = p.wait().unwrap_err().into_reason().unwrap();
        assert!(Arc::ptr_eq(&err, &cause));
    }

    #[test]
    fn test_handler_panic_rejects_link() {
        let p = resolved(1).then(|_| -> Result<Next<i32>, Reason> { panic!("kaboom") });

        let err = p.wait().unwrap_err().into_reason().unwrap();
        assert!(err.to_string().contains("kaboom"));
        assert!(p.is_rejected());
    }

    #[test]
    fn test_unhandled_rejection_is_absorbed() {
        let p = rejected::<i32>("ignored").then(|v| Ok(Next::Value(v)));
        assert!(p.is_rejected());
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let (p, settlement) = Promise::<i32>::deferred_with(inline());
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            p.then(move |v| {
                tx.send((i, v)).unwrap();
                Ok(Next::done())
            });
        }

        assert!(rx.try_recv().is_err());
        settlement.resolve(3).unwrap();

        let order: Vec<_> = rx.try_iter().collect();
        assert_eq!(order, vec![(0, 3), (1, 3), (2, 3), (3, 3), (4, 3)]);
    }

    #[test]
    fn test_settle_twice_fails() {
        let (p, settlement) = Promise::<i32>::deferred_with(inline());

        settlement.resolve(1).unwrap();
        assert_eq!(settlement.resolve(2),
                   Err(PromiseError::AlreadySettled { status: Status::Resolved }));
        assert!(settlement.reject(reason(TestError("late"))).is_err());
        assert_eq!(p.wait().unwrap(), 1);
    }

    #[test]
    fn test_cancel_cascades_to_links() {
        let (p, settlement) = Promise::<i32>::deferred_with(inline());
        let a = p.then(|v| Ok(Next::Value(v)));
        let b = a.then(|v| Ok(Next::Value(v)));

        assert!(p.cancel(true));
        assert!(p.is_cancelled());
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());

        // Late settlements are swallowed
        assert_eq!(settlement.resolve(1), Ok(()));
        assert!(p.is_cancelled());
    }

    const LONG_CHAIN: usize = 100_000;

    #[test]
    fn test_cancel_long_chain() {
        let (head, settlement) = Promise::<u64>::deferred_with(inline());
        let mut tail = head.clone();
        for _ in 0..LONG_CHAIN {
            tail = tail.then(|v| Ok(Next::Value(v + 1)));
        }

        assert!(head.cancel(true));
        assert!(tail.is_cancelled());
        assert_eq!(settlement.resolve(1), Ok(()));
    }

    struct Dropped(Arc<std::sync::atomic::AtomicUsize>);

    impl Drop for Dropped {
        fn drop(&mut self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_long_unsettled_chain() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (head, settlement) = Promise::<u64>::deferred_with(inline());

        let mut tail = head.clone();
        for _ in 0..LONG_CHAIN {
            let token = Dropped(count.clone());
            tail = tail.then(move |v| {
                let _token = &token;
                Ok(Next::Value(v))
            });
        }

        drop(tail);
        drop(head);
        drop(settlement);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), LONG_CHAIN);
    }

    #[test]
    fn test_drop_keeps_links_held_elsewhere() {
        let (source, source_settlement) = Promise::<i32>::deferred_with(inline());
        let (target, target_settlement) = Promise::<i32>::deferred_with(inline());
        let next = target.then(|v| Ok(Next::Value(v * 2)));
        target_settlement.follow(&source);

        // The followed promise goes away unsettled; the target is still settleable
        drop(source);
        drop(source_settlement);
        target_settlement.resolve(2).unwrap();
        assert_eq!(next.wait().unwrap(), 4);
    }

    #[test]
    fn test_then_on_cancelled_cancels_link() {
        let (p, _settlement) = Promise::<i32>::deferred_with(inline());
        assert!(p.cancel(false));

        let (tx, rx) = mpsc::channel();
        let link = p.then(move |v| {
            tx.send(v).unwrap();
            Ok(Next::done())
        });

        assert!(link.is_cancelled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_settled_fails() {
        assert!(!resolved(1).cancel(true));
        assert!(!rejected::<i32>("r").cancel(true));
    }

    #[test]
    fn test_work_error_rejects() {
        let p = Promise::<i32>::with_options(inline(), |_| Err(reason(TestError("work"))));
        assert!(p.is_rejected());
    }

    #[test]
    fn test_work_panic_rejects() {
        let p = Promise::<i32>::with_options(inline(), |_| panic!("work panic"));
        let err = p.wait().unwrap_err();
        assert!(err.to_string().contains("work panic"));
    }

    #[test]
    fn test_always_runs_and_passes_outcome() {
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();

        let ok = resolved(4).always(move || tx.send("resolved").unwrap());
        let err = rejected::<i32>("bad").always(move || tx2.send("rejected").unwrap());

        assert_eq!(ok.wait().unwrap(), 4);
        assert_eq!(err.wait().unwrap_err().to_string(), "promise rejected: bad");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["resolved", "rejected"]);
    }

    #[test]
    fn test_ignore_reason() {
        assert_eq!(rejected::<i32>("x").ignore_reason().wait().unwrap(), None);
        assert_eq!(resolved(5).ignore_reason().wait().unwrap(), Some(5));
    }

    #[test]
    fn test_named_promise() {
        let mut opts = inline();
        opts.name("loader".to_owned());
        let p = Promise::with_options(opts, |s: Settlement<i32>| s.resolve(1).map_err(reason));

        assert_eq!(p.name(), Some("loader"));
        assert!(format!("{:?}", p).contains("loader"));
    }
}
