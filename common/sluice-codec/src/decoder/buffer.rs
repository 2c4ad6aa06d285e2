// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::decoder::{
    value::{DecoderParameterizedValue, DecoderValue},
    DecoderError,
};
use core::convert::TryInto;

pub type DecoderBufferResult<'a, T> = Result<(T, DecoderBuffer<'a>), DecoderError>;

/// DecoderBuffer is a panic-free byte buffer for look-ahead decoding untrusted input
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct DecoderBuffer<'a> {
    bytes: &'a [u8],
}

impl<'a> DecoderBuffer<'a> {
    /// Create a new `DecoderBuffer` from a byte slice
    #[inline]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Move out the buffer's slice. This should be used with caution, as it
    /// removes any panic protection this struct provides.
    #[inline]
    pub fn into_less_safe_slice(self) -> &'a [u8] {
        self.bytes
    }

    /// Borrows the buffer's slice
    #[inline]
    pub fn as_less_safe_slice(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes a value of type `T` and returns the remaining buffer
    #[inline]
    pub fn decode<T: DecoderValue<'a>>(self) -> DecoderBufferResult<'a, T> {
        T::decode(self)
    }

    /// Decodes a value of type `T` using a parameter decoded by the caller, usually a frame tag
    #[inline]
    pub fn decode_parameterized<T: DecoderParameterizedValue<'a>>(
        self,
        parameter: T::Parameter,
    ) -> DecoderBufferResult<'a, T> {
        T::decode_parameterized(parameter, self)
    }

    /// Splits off a slice of `count` bytes
    #[inline]
    pub fn decode_slice(self, count: usize) -> DecoderBufferResult<'a, DecoderBuffer<'a>> {
        self.ensure_len(count)?;
        let (slice, remaining) = self.bytes.split_at(count);
        Ok((Self::new(slice), Self::new(remaining)))
    }

    /// Decodes a length prefix of type `Length` followed by a value of that length
    #[inline]
    pub fn decode_with_len_prefix<Length, T>(self) -> DecoderBufferResult<'a, T>
    where
        Length: DecoderValue<'a> + TryInto<usize>,
        T: DecoderValue<'a>,
    {
        let (len, buffer) = self.decode::<Length>()?;
        let len = len
            .try_into()
            .map_err(|_| DecoderError::LengthCapacityExceeded)?;
        let (slice, buffer) = buffer.decode_slice(len)?;
        let (value, remaining) = slice.decode::<T>()?;
        remaining.ensure_empty()?;
        Ok((value, buffer))
    }

    /// Decodes a length-prefixed slice
    #[inline]
    pub fn decode_slice_with_len_prefix<Length>(self) -> DecoderBufferResult<'a, DecoderBuffer<'a>>
    where
        Length: DecoderValue<'a> + TryInto<usize>,
    {
        let (len, buffer) = self.decode::<Length>()?;
        let len = len
            .try_into()
            .map_err(|_| DecoderError::LengthCapacityExceeded)?;
        buffer.decode_slice(len)
    }

    /// Skips `count` bytes
    #[inline]
    pub fn skip(self, count: usize) -> Result<DecoderBuffer<'a>, DecoderError> {
        self.decode_slice(count).map(|(_, buffer)| buffer)
    }

    /// Reads the byte at `index` without consuming it
    #[inline]
    pub fn peek_byte(&self, index: usize) -> Result<u8, DecoderError> {
        self.bytes
            .get(index)
            .copied()
            .ok_or_else(|| DecoderError::UnexpectedEof(index + 1 - self.len()))
    }

    #[inline]
    pub fn ensure_len(&self, len: usize) -> Result<(), DecoderError> {
        if self.len() < len {
            Err(DecoderError::UnexpectedEof(len - self.len()))
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn ensure_empty(&self) -> Result<(), DecoderError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DecoderError::UnexpectedBytes(self.len()))
        }
    }
}

impl<'a> From<&'a [u8]> for DecoderBuffer<'a> {
    #[inline]
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_slice_test() {
        let bytes = [1u8, 2, 3, 4];
        let buffer = DecoderBuffer::new(&bytes);
        let (slice, buffer) = buffer.decode_slice(3).unwrap();
        assert_eq!(slice.as_less_safe_slice(), &[1, 2, 3]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(
            buffer.decode_slice(2).unwrap_err(),
            DecoderError::UnexpectedEof(1)
        );
    }

    #[test]
    fn peek_byte_test() {
        let bytes = [7u8, 8, 9];
        let buffer = DecoderBuffer::new(&bytes);
        assert_eq!(buffer.peek_byte(0), Ok(7));
        assert_eq!(buffer.peek_byte(2), Ok(9));
        assert_eq!(buffer.peek_byte(3), Err(DecoderError::UnexpectedEof(1)));
        assert_eq!(buffer.peek_byte(5), Err(DecoderError::UnexpectedEof(3)));
        // peeking leaves the buffer untouched
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn len_prefix_test() {
        let bytes = [2u8, 0xaa, 0xbb, 0xcc];
        let buffer = DecoderBuffer::new(&bytes);
        let (value, buffer) = buffer.decode_with_len_prefix::<u8, u16>().unwrap();
        assert_eq!(value, 0xaabb);
        assert_eq!(buffer.as_less_safe_slice(), &[0xcc]);

        // the prefixed slice must be fully consumed
        let bytes = [3u8, 0xaa, 0xbb, 0xcc];
        let buffer = DecoderBuffer::new(&bytes);
        assert_eq!(
            buffer.decode_with_len_prefix::<u8, u16>().unwrap_err(),
            DecoderError::UnexpectedBytes(1)
        );
    }

    #[test]
    fn never_panics() {
        bolero::check!().for_each(|bytes: &[u8]| {
            let buffer = DecoderBuffer::new(bytes);
            let _ = buffer.decode::<u64>();
            let _ = buffer.decode_slice_with_len_prefix::<u8>();
            let _ = buffer.decode_with_len_prefix::<u16, u32>();
            let _ = buffer.peek_byte(bytes.len());
        });
    }
}
