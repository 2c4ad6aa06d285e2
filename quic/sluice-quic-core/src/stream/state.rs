// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Send and receive half-states of a stream
//!
//! Every event method moves the half to a new state or returns an [`Error`]
//! and leaves the state untouched.

use core::fmt;

pub type Result<T> = core::result::Result<(), Error<T>>;

/// Applies `$from => $to` if the current state matches `$from`
macro_rules! transition {
    ($state:ident, $from:pat => $to:expr) => {{
        let is_allowed = matches!($state, $from);
        $crate::stream::state::apply($state, $to, is_allowed)
    }};
}

/// Defines a predicate that holds in the listed states
macro_rules! is {
    ($($state:ident)|+, $function:ident) => {
        #[inline]
        pub fn $function(&self) -> bool {
            matches!(self, $(Self::$state)|*)
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error<T> {
    /// The half is already in the target state
    NoOp { current: T },
    /// The event isn't valid in the current state
    InvalidTransition { current: T, target: T },
}

impl<T: fmt::Debug> fmt::Display for Error<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp { current } => write!(f, "stream half is already {current:?}"),
            Self::InvalidTransition { current, target } => {
                write!(f, "stream half can't move from {current:?} to {target:?}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl<T: fmt::Debug> std::error::Error for Error<T> {}

#[inline]
fn apply<T: Copy + PartialEq + fmt::Debug>(state: &mut T, target: T, is_allowed: bool) -> Result<T> {
    let current = *state;
    if current == target {
        return Err(Error::NoOp { current });
    }
    if !is_allowed {
        return Err(Error::InvalidTransition { current, target });
    }

    #[cfg(feature = "state-tracing")]
    tracing::debug!(prev = ?current, next = ?target, "stream state");

    *state = target;
    Ok(())
}

mod recv;
mod send;

pub use recv::Receiver;
pub use send::Sender;
