// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the QUIC connection ID

use crate::random;
use core::fmt;
use sluice_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-5.1
//# Each connection possesses a set of connection identifiers, or
//# connection IDs, each of which can identify the connection.
//# Connection IDs are independently selected by endpoints; each endpoint
//# selects the connection IDs that its peer uses.

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# In QUIC version 1, this value MUST NOT exceed 20 bytes.
/// The maximum size of a connection ID.
pub const MAX_LEN: usize = 20;

/// The length of the connection IDs this implementation issues
pub const LOCAL_LEN: usize = 8;

/// Uniquely identifies a QUIC connection between 2 peers
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    bytes: [u8; MAX_LEN],
    len: u8,
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id(")?;
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Id {
    /// A zero-length connection ID
    pub const EMPTY: Self = Self {
        bytes: [0; MAX_LEN],
        len: 0,
    };

    /// Creates a connection ID from a byte slice.
    ///
    /// Returns `None` if the slice is longer than `MAX_LEN`.
    #[inline]
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        ensure!(bytes.len() <= MAX_LEN, None);
        let mut id = Self::EMPTY;
        id.bytes[..bytes.len()].copy_from_slice(bytes);
        id.len = bytes.len() as u8;
        Some(id)
    }

    /// Generates a fresh `LOCAL_LEN` byte connection ID
    #[inline]
    pub fn generate<R: random::Generator + ?Sized>(random: &mut R) -> Self {
        let mut id = Self::EMPTY;
        random.public_random_fill(&mut id.bytes[..LOCAL_LEN]);
        id.len = LOCAL_LEN as u8;
        id
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Id {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Encodes the raw ID bytes; callers write the length prefix when the format requires one
impl EncoderValue for Id {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_slice(self.as_bytes())
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_test() {
        assert!(Id::try_from_bytes(&[1; MAX_LEN]).is_some());
        assert!(Id::try_from_bytes(&[1; MAX_LEN + 1]).is_none());
        assert!(Id::EMPTY.is_empty());

        let id = Id::try_from_bytes(&[0xab, 0xcd]).unwrap();
        assert_eq!(format!("{id:?}"), "Id(abcd)");
    }

    #[test]
    fn generate_test() {
        let mut random = random::testing::Generator(1);
        let a = Id::generate(&mut random);
        let b = Id::generate(&mut random);
        assert_eq!(a.len(), LOCAL_LEN);
        assert_ne!(a, b);
    }
}
