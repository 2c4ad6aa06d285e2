// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::{Buf, BytesMut};
use sluice_quic_core::range_set::RangeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FinState {
    /// The application hasn't finished the stream
    Open,
    Pending,
    InFlight,
    Acked,
}

/// A slice of the send buffer ready to be written into a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub offset: u64,
    pub data: &'a [u8],
    pub is_fin: bool,
}

impl<'a> Chunk<'a> {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Holds written bytes until they are acknowledged by the peer
///
/// The buffer tracks which ranges still need to be transmitted, either for the
/// first time or after being declared lost. Acknowledged ranges are never
/// scheduled again and bytes are released once everything before them is acknowledged.
#[derive(Debug)]
pub struct SendBuffer {
    /// Unacknowledged bytes, starting at `base`
    data: BytesMut,
    base: u64,
    acked: RangeSet,
    pending: RangeSet,
    /// The highest offset ever written into a frame
    max_sent: u64,
    final_size: Option<u64>,
    fin: FinState,
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SendBuffer {
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            base: 0,
            acked: RangeSet::new(),
            pending: RangeSet::new(),
            max_sent: 0,
            final_size: None,
            fin: FinState::Open,
        }
    }

    /// Returns the total number of bytes ever written
    #[inline]
    pub fn len(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of bytes held until they are acknowledged
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.final_size.is_some()
    }

    /// Returns `true` once the FIN was written into a frame
    #[inline]
    pub fn is_fin_sent(&self) -> bool {
        matches!(self.fin, FinState::InFlight | FinState::Acked)
    }

    #[inline]
    pub fn max_sent(&self) -> u64 {
        self.max_sent
    }

    #[inline]
    pub fn acked(&self) -> &RangeSet {
        &self.acked
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        !self.pending.is_empty() || self.fin == FinState::Pending
    }

    /// Returns `true` when every byte and the FIN were acknowledged
    #[inline]
    pub fn is_fully_acked(&self) -> bool {
        self.fin == FinState::Acked
            && self
                .final_size
                .map_or(false, |size| self.acked.contains_range(0..size))
    }

    /// Appends bytes to the end of the stream
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) {
        debug_assert!(self.final_size.is_none(), "write after finish");
        ensure!(!bytes.is_empty());
        let start = self.len();
        self.data.extend_from_slice(bytes);
        self.pending.insert(start..self.len());
    }

    /// Fixes the final size at the current length
    #[inline]
    pub fn finish(&mut self) {
        ensure!(self.final_size.is_none());
        self.final_size = Some(self.len());
        self.fin = FinState::Pending;
    }

    /// Returns the next range to transmit
    ///
    /// Bytes above [`Self::max_sent`] are new to the peer and limited by
    /// `new_data_limit`; retransmissions are only limited by `max_len`.
    pub fn next_chunk(&self, new_data_limit: u64, max_len: usize) -> Option<Chunk<'_>> {
        let Some(range) = self.pending.first() else {
            ensure!(self.fin == FinState::Pending, None);
            let offset = self.final_size?;
            return Some(Chunk {
                offset,
                data: &[],
                is_fin: true,
            });
        };

        let start = range.start;
        let end = range
            .end
            .min(start.saturating_add(max_len as u64))
            .min(new_data_limit.max(self.max_sent));
        ensure!(end > start, None);

        let is_fin =
            self.fin == FinState::Pending && self.final_size == Some(end) && range.end == end;
        let data = self
            .data
            .get((start - self.base) as usize..(end - self.base) as usize)?;

        Some(Chunk {
            offset: start,
            data,
            is_fin,
        })
    }

    /// Marks a chunk as written into a frame
    #[inline]
    pub fn on_transmit(&mut self, offset: u64, len: usize, is_fin: bool) {
        let end = offset + len as u64;
        self.pending.remove(offset..end);
        self.max_sent = self.max_sent.max(end);
        if is_fin && self.fin == FinState::Pending {
            self.fin = FinState::InFlight;
        }
    }

    #[inline]
    pub fn on_ack(&mut self, offset: u64, len: usize, is_fin: bool) {
        let end = offset + len as u64;
        self.acked.insert(offset..end);
        self.pending.remove(offset..end);
        if is_fin {
            self.fin = FinState::Acked;
        }
        self.release();
    }

    #[inline]
    pub fn on_lost(&mut self, offset: u64, len: usize, is_fin: bool) {
        let end = offset + len as u64;
        for gap in self.acked.gaps(offset..end) {
            self.pending.insert(gap);
        }
        if is_fin && self.fin == FinState::InFlight {
            self.fin = FinState::Pending;
        }
    }

    /// Drops everything that wasn't acknowledged yet
    #[inline]
    pub fn discard(&mut self) {
        self.base = self.len();
        self.data.clear();
        self.pending.clear();
        if self.fin != FinState::Acked {
            self.fin = FinState::Open;
        }
    }

    /// Releases the acknowledged prefix of the buffer
    fn release(&mut self) {
        ensure!(let Some(prefix) = self.acked.first(), ());
        ensure!(prefix.start == 0 && prefix.end > self.base);
        let len = ((prefix.end - self.base) as usize).min(self.data.len());
        self.data.advance(len);
        self.base += len as u64;
    }
}
