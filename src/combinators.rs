// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Combining several promises into one

use std::sync::{Arc, Mutex, PoisonError};
use std::vec;

use crate::options::Options;
use crate::promise::{Next, Promise, Settlement};

fn options_of<T>(promise: &Promise<T>) -> Options
    where T: Clone + Send + 'static
{
    let mut opts = Options::new();
    opts.executor(promise.executor().clone());
    opts
}

/// Resolve with the values of all `promises`, in input order.
///
/// Rejects with the first rejection the combinator observes. The inputs are
/// attached one after another, but each of them was already running since
/// it was constructed, so attaching in order never serializes their work.
pub fn all<T>(promises: Vec<Promise<T>>) -> Promise<Vec<T>>
    where T: Clone + Send + 'static
{
    let opts = match promises.first() {
        Some(first) => options_of(first),
        None => return Promise::resolve(Vec::new()),
    };

    let (promise, settlement) = Promise::deferred_with(opts);
    let results = Vec::with_capacity(promises.len());
    collect(promises.into_iter(), results, settlement);
    promise
}

fn collect<T>(mut rest: vec::IntoIter<Promise<T>>, mut results: Vec<T>, settlement: Settlement<Vec<T>>)
    where T: Clone + Send + 'static
{
    if settlement.is_cancelled() {
        return;
    }

    let current = match rest.next() {
        Some(current) => current,
        None => {
            if let Err(err) = settlement.resolve(results) {
                error!("all() settled twice: {}", err);
            }
            return;
        }
    };

    let on_rejected = settlement.clone();
    current.then_or(move |value| {
                        results.push(value);
                        collect(rest, results, settlement);
                        Ok(Next::done())
                    },
                    move |reason| {
                        if let Err(err) = on_rejected.reject(reason) {
                            error!("all() settled twice: {}", err);
                        }
                        Ok(Next::done())
                    });
}

/// Settle like whichever of `promises` settles first.
///
/// Resolves with `Some(value)` of the winner, or with `None` right away when
/// `promises` is empty. Later settlements are dropped.
pub fn race<T>(promises: Vec<Promise<T>>) -> Promise<Option<T>>
    where T: Clone + Send + 'static
{
    let opts = match promises.first() {
        Some(first) => options_of(first),
        None => return Promise::resolve(None),
    };

    let (promise, settlement) = Promise::deferred_with(opts);
    let winner = Arc::new(Mutex::new(Some(settlement)));

    for (index, input) in promises.into_iter().enumerate() {
        let on_resolved = winner.clone();
        let on_rejected = winner.clone();

        input.then_or(move |value| {
                          match take(&on_resolved) {
                              Some(settlement) => {
                                  if let Err(err) = settlement.resolve(Some(value)) {
                                      error!("race() settled twice: {}", err);
                                  }
                              }
                              None => debug!("race(): input {} resolved after the race was decided", index),
                          }
                          Ok(Next::done())
                      },
                      move |reason| {
                          match take(&on_rejected) {
                              Some(settlement) => {
                                  if let Err(err) = settlement.reject(reason) {
                                      error!("race() settled twice: {}", err);
                                  }
                              }
                              None => debug!("race(): input {} rejected after the race was decided", index),
                          }
                          Ok(Next::done())
                      });
    }

    promise
}

// First writer wins
fn take<T>(winner: &Mutex<Option<Settlement<T>>>) -> Option<Settlement<T>> {
    winner.lock().unwrap_or_else(PoisonError::into_inner).take()
}
