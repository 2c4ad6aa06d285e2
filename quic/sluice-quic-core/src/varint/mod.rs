// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUIC variable-length integers

use core::{fmt, ops};
use sluice_codec::{decoder_value, Encoder, EncoderValue};

#[cfg(test)]
mod tests;

//= https://www.rfc-editor.org/rfc/rfc9000#section-16
//# This means that integers are encoded on 1, 2, 4, or 8 bytes and can
//# encode 6-, 14-, 30-, or 62-bit values, respectively.

pub const MAX_VARINT_VALUE: u64 = (1 << 62) - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarIntError;

impl fmt::Display for VarIntError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("value exceeds 2^62 - 1")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VarIntError {}

/// Number of bytes the shortest encoding of `value` takes
#[inline]
const fn encoded_len(value: u64) -> usize {
    if value < 1 << 6 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 30 {
        4
    } else {
        8
    }
}

/// An integer in the range `0..2^62`
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct VarInt(u64);

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl VarInt {
    pub const MAX: Self = Self(MAX_VARINT_VALUE);
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(value: u64) -> Result<Self, VarIntError> {
        if value > MAX_VARINT_VALUE {
            Err(VarIntError)
        } else {
            Ok(Self(value))
        }
    }

    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u16(value: u16) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).and_then(|sum| Self::new(sum).ok())
    }

    #[inline]
    pub fn checked_add_usize(self, rhs: usize) -> Option<Self> {
        self.checked_add(Self::try_from(rhs).ok()?)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    #[inline]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).and_then(|product| Self::new(product).ok())
    }

    #[inline]
    #[must_use]
    pub fn saturating_add(self, rhs: Self) -> Self {
        self.checked_add(rhs).unwrap_or(Self::MAX)
    }

    #[inline]
    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Overwrites a value that was encoded earlier as a placeholder
    ///
    /// The replacement keeps the encoded length of `self`, so the long header
    /// Length field can be written before the payload size is known.
    #[inline]
    pub fn encode_updated<E: Encoder>(self, replacement: Self, encoder: &mut E) {
        let len = encoded_len(self.0);
        debug_assert!(encoded_len(replacement.0) <= len);
        replacement.encode_with_len(len, encoder);
    }

    /// Encodes the value using exactly `len` bytes, which must be 1, 2, 4 or 8
    #[inline]
    pub fn encode_with_len<E: Encoder>(self, len: usize, encoder: &mut E) {
        debug_assert!(matches!(len, 1 | 2 | 4 | 8));
        debug_assert!(encoded_len(self.0) <= len);
        // the top two bits of the first byte carry log2(len)
        let prefix = (len.trailing_zeros() as u64) << (len * 8 - 2);
        let bytes = (prefix | self.0).to_be_bytes();
        encoder.write_slice(&bytes[8 - len..]);
    }
}

impl EncoderValue for VarInt {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        self.encode_with_len(encoded_len(self.0), encoder);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        encoded_len(self.0)
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
        encoded_len(self.0)
    }
}

decoder_value!(
    impl<'a> VarInt {
        fn decode(buffer: Buffer) -> Result<Self> {
            let len = 1usize << (buffer.peek_byte(0)? >> 6);
            let (bytes, buffer) = buffer.decode_slice(len)?;
            let value = bytes
                .as_less_safe_slice()
                .iter()
                .fold(0u64, |value, byte| value << 8 | *byte as u64);
            // strip the length prefix
            let value = value & (u64::MAX >> (64 - (len * 8 - 2)));
            Ok((Self(value), buffer))
        }
    }
);

impl AsRef<u64> for VarInt {
    #[inline]
    fn as_ref(&self) -> &u64 {
        &self.0
    }
}

impl ops::Deref for VarInt {
    type Target = u64;

    #[inline]
    fn deref(&self) -> &u64 {
        &self.0
    }
}

macro_rules! from_narrow {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for VarInt {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self(value as u64)
                }
            }
        )*
    };
}

from_narrow!(u8, u16, u32);

impl From<VarInt> for u64 {
    #[inline]
    fn from(value: VarInt) -> u64 {
        value.0
    }
}

impl TryFrom<u64> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, VarIntError> {
        Self::new(value)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: usize) -> Result<Self, VarIntError> {
        Self::new(value as u64)
    }
}

impl TryFrom<VarInt> for usize {
    type Error = core::num::TryFromIntError;

    #[inline]
    fn try_from(value: VarInt) -> Result<usize, Self::Error> {
        usize::try_from(value.0)
    }
}

// Arithmetic overflow is a logic error, like it is for the primitive types
impl ops::Add for VarInt {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn add(self, rhs: Self) -> Self {
        let sum = self.0 + rhs.0;
        debug_assert!(sum <= MAX_VARINT_VALUE, "VarInt overflow");
        Self(sum)
    }
}

impl ops::Add<usize> for VarInt {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn add(self, rhs: usize) -> Self {
        self + Self(rhs as u64)
    }
}

impl ops::Sub for VarInt {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl ops::AddAssign for VarInt {
    #[inline]
    #[track_caller]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl ops::AddAssign<usize> for VarInt {
    #[inline]
    #[track_caller]
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::SubAssign for VarInt {
    #[inline]
    #[track_caller]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl PartialEq<u64> for VarInt {
    #[inline]
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<u64> for VarInt {
    #[inline]
    fn partial_cmp(&self, other: &u64) -> Option<core::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}
