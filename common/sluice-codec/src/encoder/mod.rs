// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Writing values into byte buffers
//!
//! Two encoders exist: [`EncoderBuffer`] writes into a mutable slice and
//! [`EncoderLenEstimator`] only counts, so a packet can be sized before it
//! is written.

pub mod buffer;
pub mod estimator;
pub mod value;

pub use buffer::EncoderBuffer;
pub use estimator::EncoderLenEstimator;
pub use value::EncoderValue;

pub trait Encoder: Sized {
    /// Hands `len` bytes at the cursor to `write` and moves the cursor past them
    fn write_sized<F: FnOnce(&mut [u8])>(&mut self, len: usize, write: F);

    /// Copies `slice` to the cursor
    fn write_slice(&mut self, slice: &[u8]);

    /// Writes `count` zero bytes, which QUIC reads as PADDING
    fn write_zeroes(&mut self, count: usize);

    /// Total number of bytes the encoder accepts
    fn capacity(&self) -> usize;

    /// Number of bytes written so far
    fn len(&self) -> usize;

    #[inline]
    fn encode<T: EncoderValue>(&mut self, value: &T) {
        value.encode(self)
    }

    /// Writes `value` preceded by its length, encoded as `Len`
    #[inline]
    fn encode_with_len_prefix<Len, T>(&mut self, value: &T)
    where
        Len: TryFrom<usize> + EncoderValue,
        T: EncoderValue,
    {
        value.encode_with_len_prefix::<Len, Self>(self)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }
}
