// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::timestamp::Timestamp;
use core::task::Poll;

/// A single-shot deadline owned by a connection component
///
/// Components arm timers and the connection polls them against the
/// caller-supplied `now`. The timer isn't `Copy` so an armed deadline
/// can't be silently duplicated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    expiration: Option<Timestamp>,
}

impl Timer {
    /// Sets the timer to expire at the given timestamp
    #[inline]
    pub fn set(&mut self, time: Timestamp) {
        self.expiration = Some(time);
    }

    /// Cancels the timer.
    /// After cancellation, a timer will no longer report as expired.
    #[inline]
    pub fn cancel(&mut self) {
        self.expiration = None;
    }

    /// Returns true if the timer has expired
    #[inline]
    pub fn is_expired(&self, current_time: Timestamp) -> bool {
        match self.expiration {
            Some(timeout) => timeout.has_elapsed(current_time),
            _ => false,
        }
    }

    /// Returns true if the timer is armed
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.expiration.is_some()
    }

    /// Returns the deadline, if armed
    #[inline]
    pub fn expiration(&self) -> Option<Timestamp> {
        self.expiration
    }

    /// Arms the timer only if it isn't armed already
    #[inline]
    pub fn set_if_unarmed(&mut self, time: Timestamp) {
        if self.expiration.is_none() {
            self.expiration = Some(time);
        }
    }

    /// Notifies the timer of the current time.
    /// If the timer's expiration occurs before the current time, it will be cancelled.
    /// The method returns whether the timer was expired and had been
    /// cancelled.
    #[inline]
    pub fn poll_expiration(&mut self, current_time: Timestamp) -> Poll<()> {
        if self.is_expired(current_time) {
            self.cancel();
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    /// Iterates over the contained timers
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Timestamp> {
        Iter(self.expiration)
    }
}

pub struct Iter(Option<Timestamp>);

impl Iterator for Iter {
    type Item = Timestamp;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.take()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.iter().size_hint()
    }

    #[inline]
    fn min(self) -> Option<Self::Item> {
        self.0
    }
}

impl core::iter::ExactSizeIterator for Iter {
    fn len(&self) -> usize {
        self.0.iter().len()
    }
}

// Let consumers know that they don't need to do additional fusing
impl core::iter::FusedIterator for Iter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{testing, Clock};
    use core::time::Duration;

    #[test]
    fn arm_and_cancel_test() {
        let now = testing::Clock::default().get_time();
        let mut timer = Timer::default();
        assert!(!timer.is_armed());
        assert_eq!(timer.iter().count(), 0);

        timer.set(now);
        assert!(timer.is_armed());
        assert_eq!(timer.iter().min(), Some(now));

        timer.set_if_unarmed(now + Duration::from_secs(1));
        assert_eq!(timer.expiration(), Some(now));

        timer.cancel();
        assert!(!timer.is_armed());
    }

    #[test]
    fn poll_expiration_test() {
        let mut clock = testing::Clock::default();
        let mut timer = Timer::default();

        timer.set(clock.get_time() + Duration::from_millis(25));
        assert!(timer.poll_expiration(clock.get_time()).is_pending());

        clock.inc_by(Duration::from_millis(24));
        assert!(!timer.is_expired(clock.get_time()));

        clock.inc_by(Duration::from_millis(1));
        assert!(timer.poll_expiration(clock.get_time()).is_ready());
        assert!(!timer.is_armed());

        // fires only once
        assert!(timer.poll_expiration(clock.get_time()).is_pending());
    }
}
