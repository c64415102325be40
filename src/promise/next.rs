// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;

use super::Promise;

/// What a handler hands to the next stage of a chain.
pub enum Next<T> {
    /// Resolve the next stage with this value
    Value(T),
    /// Settle the next stage once this promise settles
    Chain(Promise<T>),
}

impl Next<()> {
    /// The handler produced nothing
    #[inline]
    pub fn done() -> Next<()> {
        Next::Value(())
    }
}

impl<T> From<T> for Next<T> {
    fn from(value: T) -> Next<T> {
        Next::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Next::Value(ref v) => f.debug_tuple("Value").field(v).finish(),
            Next::Chain(_) => f.write_str("Chain(..)"),
        }
    }
}
