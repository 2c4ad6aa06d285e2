// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, time::Duration};

/// An absolute point in time, relative to an epoch chosen by the caller
///
/// The connection engine never reads a clock itself; every timestamp is
/// supplied by the embedding application.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.0.as_micros();
        write!(f, "{}.{:06}", micros / 1_000_000, micros % 1_000_000)
    }
}

impl Timestamp {
    /// Creates a `Timestamp` from a `Duration` since the epoch
    #[inline]
    pub const fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Creates a `Timestamp` from milliseconds since the epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Returns the `Duration` since the epoch
    #[inline]
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    /// Returns the time elapsed since `earlier`, or zero if `earlier` is in the future
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    #[inline]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        self.0.checked_add(duration).map(Self)
    }

    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        self.0.checked_sub(duration).map(Self)
    }

    /// Returns true if `self` is at or before `now`
    #[inline]
    pub fn has_elapsed(self, now: Self) -> bool {
        self <= now
    }
}

impl core::ops::Add<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl core::ops::AddAssign<Duration> for Timestamp {
    #[inline]
    #[track_caller]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl core::ops::Sub for Timestamp {
    type Output = Duration;

    #[inline]
    #[track_caller]
    fn sub(self, rhs: Self) -> Duration {
        self.0 - rhs.0
    }
}

impl core::ops::Sub<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn sub(self, rhs: Duration) -> Self {
        Self(self.0 - rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_test() {
        let start = Timestamp::from_millis(10);
        let later = start + Duration::from_millis(5);
        assert_eq!(later - start, Duration::from_millis(5));
        assert_eq!(start.saturating_duration_since(later), Duration::ZERO);
        assert!(start.has_elapsed(later));
        assert!(!later.has_elapsed(start));
        assert_eq!(later - Duration::from_millis(5), start);
        assert_eq!(start.checked_sub(Duration::from_secs(1)), None);
        assert_eq!(format!("{later}"), "0.015000");
    }
}
