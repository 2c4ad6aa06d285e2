// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::timestamp::Timestamp;

/// A `Clock` is a source of [`Timestamp`]s.
pub trait Clock {
    /// Returns the current [`Timestamp`]
    fn get_time(&self) -> Timestamp;
}

impl Clock for Timestamp {
    #[inline]
    fn get_time(&self) -> Timestamp {
        *self
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use core::time::Duration;

    /// A manually driven clock
    ///
    /// Starts one second after the epoch so tests can subtract small durations.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Clock {
        current: Timestamp,
    }

    impl Default for Clock {
        fn default() -> Self {
            Self {
                current: Timestamp::from_millis(1_000),
            }
        }
    }

    impl Clock {
        #[inline]
        pub fn inc_by(&mut self, duration: Duration) {
            self.current += duration;
        }

        /// Moves the clock forward to `timestamp`; earlier values are ignored
        #[inline]
        pub fn advance_to(&mut self, timestamp: Timestamp) {
            self.current = self.current.max(timestamp);
        }
    }

    impl super::Clock for Clock {
        #[inline]
        fn get_time(&self) -> Timestamp {
            self.current
        }
    }
}
