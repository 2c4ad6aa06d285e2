// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use alloc::collections::BTreeMap;
use bytes::{Buf, Bytes, BytesMut};
use sluice_quic_core::range_set::RangeSet;

/// Reorders received bytes into a contiguous stream
///
/// Bytes that arrive in order are appended to the readable region directly.
/// Bytes beyond a gap are held by offset until the gap is filled. Overlapping and
/// duplicate ranges are dropped, so every offset is stored at most once.
#[derive(Debug, Default)]
pub struct Reassembler {
    /// Contiguous bytes that haven't been consumed
    readable: BytesMut,
    /// Out-of-order bytes keyed by their offset
    pending: BTreeMap<u64, Bytes>,
    received: RangeSet,
    consumed: u64,
    max_offset: u64,
}

impl Reassembler {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the contiguous bytes that haven't been consumed
    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.readable
    }

    /// Returns the offset up to which bytes were consumed
    #[inline]
    pub fn consumed_offset(&self) -> u64 {
        self.consumed
    }

    /// Returns the end of the contiguous region
    #[inline]
    pub fn frontier(&self) -> u64 {
        self.consumed + self.readable.len() as u64
    }

    /// Returns the highest offset seen so far
    #[inline]
    pub fn max_offset(&self) -> u64 {
        self.max_offset
    }

    #[inline]
    pub fn received(&self) -> &RangeSet {
        &self.received
    }

    /// Returns the number of out-of-order bytes held
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(Bytes::len).sum()
    }

    /// Writes `data` at `offset`
    ///
    /// Returns the number of bytes that were new.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> u64 {
        let end = offset + data.len() as u64;
        self.max_offset = self.max_offset.max(end);
        ensure!(end > self.frontier(), 0);

        let mut new_bytes = 0;
        for gap in self.received.gaps(offset..end) {
            let start = (gap.start - offset) as usize;
            let stop = (gap.end - offset) as usize;
            new_bytes += gap.end - gap.start;
            self.pending
                .insert(gap.start, Bytes::copy_from_slice(&data[start..stop]));
        }
        self.received.insert(offset..end);

        // move everything that became contiguous into the readable region
        loop {
            let frontier = self.frontier();
            let Some(entry) = self.pending.first_entry() else {
                break;
            };
            if *entry.key() != frontier {
                break;
            }
            let chunk = entry.remove();
            self.readable.extend_from_slice(&chunk);
        }

        new_bytes
    }

    /// Releases up to `len` readable bytes and returns the number released
    #[inline]
    pub fn consume(&mut self, len: usize) -> usize {
        let len = len.min(self.readable.len());
        self.readable.advance(len);
        self.consumed += len as u64;
        len
    }

    /// Takes up to `max_len` readable bytes
    #[inline]
    pub fn pop(&mut self, max_len: Option<usize>) -> Option<Bytes> {
        ensure!(!self.readable.is_empty(), None);
        let len = max_len.map_or(self.readable.len(), |max| max.min(self.readable.len()));
        self.consumed += len as u64;
        Some(self.readable.split_to(len).freeze())
    }

    /// Drops all buffered bytes, treating everything up to `offset` as consumed
    #[inline]
    pub fn reset(&mut self, offset: u64) {
        self.readable.clear();
        self.pending.clear();
        self.consumed = self.consumed.max(offset);
        self.max_offset = self.max_offset.max(offset);
    }
}
