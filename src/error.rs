// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors and rejection reasons

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::promise::Status;

/// The cause a promise was rejected with.
///
/// Reasons are shared, never wrapped: every continuation and every waiter
/// observes the very same allocation the rejection started with.
pub type Reason = Arc<dyn StdError + Send + Sync + 'static>;

/// Turn any error into a `Reason`
pub fn reason<E>(err: E) -> Reason
    where E: StdError + Send + Sync + 'static
{
    Arc::new(err)
}

/// Misuse of a `Settlement`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromiseError {
    /// `resolve` or `reject` was called on a promise that already settled.
    #[error("promise must be pending to settle, but it is {status:?}")]
    AlreadySettled { status: Status },
}

/// Why a blocking wait on a promise did not produce a value
#[derive(Debug, Clone, Error)]
pub enum AwaitError {
    #[error("promise rejected: {0}")]
    Rejected(Reason),

    #[error("deadline exceeded before the promise settled")]
    DeadlineExceeded,

    #[error("wait was interrupted")]
    Interrupted,

    #[error("promise was cancelled")]
    Cancelled,
}

impl AwaitError {
    /// The rejection reason, if the promise was rejected
    pub fn reason(&self) -> Option<&Reason> {
        match *self {
            AwaitError::Rejected(ref reason) => Some(reason),
            _ => None,
        }
    }

    /// Unwrap the original rejection reason
    pub fn into_reason(self) -> Option<Reason> {
        match self {
            AwaitError::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Reason used when a work function or a handler panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanicked {
    pub message: String,
}

impl HandlerPanicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> HandlerPanicked {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_owned(),
                Err(_) => "Box<dyn Any>".to_owned(),
            },
        };

        HandlerPanicked { message }
    }
}
