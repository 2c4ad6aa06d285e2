// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines QUIC Application Error Codes

use crate::varint::{VarInt, VarIntError};
use core::{fmt, ops};

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.2
//# The management of application error codes is left to application
//# protocols.

/// Application Error Codes are 62-bit unsigned integer values which
/// may be used by applications to exchange errors.
///
/// They are carried in RESET_STREAM, STOP_SENDING and the application
/// variant of CONNECTION_CLOSE.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Error(VarInt);

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "application::Error({})", self.0.as_u64())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QUIC application error code: {}", self.0.as_u64())
    }
}

impl Error {
    /// An error code that can be used when the application cannot provide
    /// a more meaningful code.
    pub const UNKNOWN: Self = Self(VarInt::from_u8(0));

    /// Creates an application `Error` from an unsigned integer.
    ///
    /// Returns `Err` if the value doesn't fit in a varint.
    #[inline]
    pub fn new(value: u64) -> Result<Self, VarIntError> {
        Ok(Self(VarInt::new(value)?))
    }

    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(VarInt::from_u32(value))
    }

    #[inline]
    pub const fn as_varint(self) -> VarInt {
        self.0
    }
}

impl ops::Deref for Error {
    type Target = u64;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl From<VarInt> for Error {
    #[inline]
    fn from(value: VarInt) -> Self {
        Self(value)
    }
}

impl From<Error> for VarInt {
    #[inline]
    fn from(e: Error) -> Self {
        e.0
    }
}

impl From<Error> for u64 {
    #[inline]
    fn from(e: Error) -> Self {
        e.0.as_u64()
    }
}
