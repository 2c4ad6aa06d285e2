// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! An ordered set of half-open `u64` intervals
//!
//! Used for received packet numbers, acknowledged and pending stream offsets
//! and reassembly gap tracking.

use alloc::{
    collections::{vec_deque, VecDeque},
    vec::Vec,
};
use core::{fmt, num::NonZeroUsize, ops::Range};

/// `RangeSet` stores consecutive values as `[start, end)` intervals.
///
/// Intervals never overlap, never touch, and are never empty.
///
/// ```
/// use sluice_quic_core::range_set::RangeSet;
///
/// let mut set = RangeSet::new();
/// set.insert(0..4);
/// set.insert(4..8);
/// // adjacent intervals coalesce
/// assert_eq!(set.interval_len(), 1);
/// assert!(set.contains(7));
/// assert!(!set.contains(8));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: VecDeque<Range<u64>>,
    limit: Option<NonZeroUsize>,
}

impl fmt::Debug for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ranges.iter()).finish()
    }
}

impl RangeSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set which keeps at most `limit` intervals.
    ///
    /// When an insertion would exceed the limit, the lowest interval is dropped.
    #[inline]
    pub fn with_limit(limit: NonZeroUsize) -> Self {
        Self {
            ranges: VecDeque::new(),
            limit: Some(limit),
        }
    }

    /// Returns the number of intervals
    #[inline]
    pub fn interval_len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the number of values covered by the set
    #[inline]
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }

    /// Returns the smallest value in the set
    #[inline]
    pub fn min_value(&self) -> Option<u64> {
        self.ranges.front().map(|r| r.start)
    }

    /// Returns the largest value in the set
    #[inline]
    pub fn max_value(&self) -> Option<u64> {
        self.ranges.back().map(|r| r.end - 1)
    }

    /// Returns the lowest interval
    #[inline]
    pub fn first(&self) -> Option<Range<u64>> {
        self.ranges.front().cloned()
    }

    #[inline]
    pub fn pop_min(&mut self) -> Option<Range<u64>> {
        self.ranges.pop_front()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Iterates over the intervals in ascending order
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.ranges.iter())
    }

    /// Inserts `range` and returns `true` if any new value was added
    pub fn insert(&mut self, range: Range<u64>) -> bool {
        let Range { start, end } = range;
        ensure!(start < end, false);

        // intervals that overlap or touch the new one
        let first = self.ranges.partition_point(|r| r.end < start);
        let last = self.ranges.partition_point(|r| r.start <= end);

        if first == last {
            self.ranges.insert(first, start..end);
            self.enforce_limit();
            return true;
        }

        let existing = &self.ranges[first];
        let covered = last - first == 1 && existing.start <= start && existing.end >= end;

        let merged_start = start.min(existing.start);
        let merged_end = end.max(self.ranges[last - 1].end);
        self.ranges[first] = merged_start..merged_end;
        self.ranges.drain(first + 1..last);

        !covered
    }

    /// Inserts a single value
    #[inline]
    pub fn insert_value(&mut self, value: u64) -> bool {
        self.insert(value..value + 1)
    }

    /// Removes all values in `range`
    pub fn remove(&mut self, range: Range<u64>) {
        let Range { start, end } = range;
        ensure!(start < end);

        let first = self.ranges.partition_point(|r| r.end <= start);
        let last = self.ranges.partition_point(|r| r.start < end);
        ensure!(first < last);

        let head = self.ranges[first].start;
        let tail = self.ranges[last - 1].end;
        self.ranges.drain(first..last);

        if tail > end {
            self.ranges.insert(first, end..tail);
        }
        if head < start {
            self.ranges.insert(first, head..start);
        }

        self.enforce_limit();
    }

    /// Returns `true` if the set contains `value`
    #[inline]
    pub fn contains(&self, value: u64) -> bool {
        let index = self.ranges.partition_point(|r| r.end <= value);
        self.ranges
            .get(index)
            .map_or(false, |r| r.start <= value)
    }

    /// Returns `true` if every value in `range` is in the set
    #[inline]
    pub fn contains_range(&self, range: Range<u64>) -> bool {
        if range.start >= range.end {
            return true;
        }
        let index = self.ranges.partition_point(|r| r.end <= range.start);
        self.ranges
            .get(index)
            .map_or(false, |r| r.start <= range.start && r.end >= range.end)
    }

    /// Returns the parts of `range` that are not in the set
    pub fn gaps(&self, range: Range<u64>) -> Vec<Range<u64>> {
        let mut gaps = Vec::new();
        let mut cursor = range.start;
        let first = self.ranges.partition_point(|r| r.end <= range.start);

        for r in self.ranges.iter().skip(first) {
            if r.start >= range.end {
                break;
            }
            if r.start > cursor {
                gaps.push(cursor..r.start);
            }
            cursor = cursor.max(r.end);
        }

        if cursor < range.end {
            gaps.push(cursor..range.end);
        }

        gaps
    }

    #[inline]
    fn enforce_limit(&mut self) {
        if let Some(limit) = self.limit {
            while self.ranges.len() > limit.get() {
                self.ranges.pop_front();
            }
        }
        self.check_integrity();
    }

    #[inline]
    fn check_integrity(&self) {
        if cfg!(test) {
            let mut prev_end = None;
            for r in self.ranges.iter() {
                assert!(r.start < r.end, "intervals should not be empty");
                if let Some(prev_end) = prev_end {
                    assert!(prev_end < r.start, "intervals should not touch");
                }
                prev_end = Some(r.end);
            }
        }
    }
}

/// An iterator over the intervals of a [`RangeSet`]
#[derive(Clone, Debug)]
pub struct Iter<'a>(vec_deque::Iter<'a, Range<u64>>);

impl<'a> Iterator for Iter<'a> {
    type Item = Range<u64>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().cloned()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<'a> DoubleEndedIterator for Iter<'a> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().cloned()
    }
}

impl<'a> ExactSizeIterator for Iter<'a> {}
