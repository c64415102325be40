// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Promise options

use std::default::Default;
use std::fmt;
use std::sync::Arc;

use crate::scheduler::Executor;

/// Promise options
#[derive(Clone)]
pub struct Options {
    pub name: Option<String>,
    /// Runs the work function and every handler; the process-wide pool if `None`
    pub executor: Option<Arc<dyn Executor>>,
}

impl Options {
    pub fn new() -> Options {
        Options {
            name: None,
            executor: None,
        }
    }

    pub fn name(&mut self, name: String) -> &mut Options {
        self.name = Some(name);
        self
    }

    pub fn executor(&mut self, executor: Arc<dyn Executor>) -> &mut Options {
        self.executor = Some(executor);
        self
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Options")
            .field("name", &self.name)
            .field("executor", &self.executor.as_ref().map(|_| ".."))
            .finish()
    }
}
