// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::encoder::Encoder;

/// EncoderBuffer is a buffer for writing to a mutable byte slice
///
/// Writes past the end of the slice panic; callers check
/// `remaining_capacity` or `EncoderValue::encoding_size` first.
#[derive(Debug)]
pub struct EncoderBuffer<'a> {
    bytes: &'a mut [u8],
    position: usize,
}

impl<'a> EncoderBuffer<'a> {
    /// Creates a new `EncoderBuffer`
    #[inline]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Sets the write cursor to a new position
    ///
    /// # Panics
    /// Panics when `position > capacity`
    #[inline]
    pub fn set_position(&mut self, position: usize) {
        self.assert_position(position);
        self.position = position;
    }

    /// Advances the write cursor by `offset`
    #[inline]
    pub fn advance_position(&mut self, offset: usize) {
        self.set_position(self.position + offset)
    }

    /// Returns the current write position
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the written bytes
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.position]
    }

    /// Returns the written bytes as a mutable slice
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.position]
    }

    /// Splits the written bytes from the unwritten capacity
    #[inline]
    pub fn split_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        self.bytes.split_at_mut(self.position)
    }

    #[inline]
    fn assert_position(&self, position: usize) {
        assert!(
            position <= self.bytes.len(),
            "position {position} exceeded capacity {}",
            self.bytes.len()
        );
    }
}

impl<'a> Encoder for EncoderBuffer<'a> {
    #[inline]
    fn write_sized<F: FnOnce(&mut [u8])>(&mut self, len: usize, write: F) {
        let end = self.position + len;
        self.assert_position(end);
        write(&mut self.bytes[self.position..end]);
        self.position = end;
    }

    #[inline]
    fn write_slice(&mut self, slice: &[u8]) {
        self.write_sized(slice.len(), |dest| dest.copy_from_slice(slice));
    }

    #[inline]
    fn write_zeroes(&mut self, count: usize) {
        self.write_sized(count, |dest| dest.fill(0));
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_zeroes_test() {
        let mut buffer = [255u8; 8];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encoder.encode(&1u8);
        encoder.write_zeroes(4);
        assert_eq!(encoder.remaining_capacity(), 3);
        assert_eq!(&buffer[0..6], &[1, 0, 0, 0, 0, 255]);
    }

    #[test]
    #[should_panic]
    fn overflow_panics() {
        let mut buffer = [0u8; 2];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encoder.encode(&1u32);
    }
}
