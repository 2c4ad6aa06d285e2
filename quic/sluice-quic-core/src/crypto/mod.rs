// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! QUIC cryptography traits
//!
//! The connection never derives keys itself. A [`tls::Session`] produces a
//! [`Keys`] pair per encryption level and the packet codec drives each
//! [`Key`] through the following flow:
//!
//! ```text
//!  sealing                               opening
//!
//!  +---------+                           +---------+
//!  |cleartext|                           |protected|
//!  +----+----+                           +----+----+
//!       | encrypt(pn, header)                 | remove header protection
//!       v                                     v
//!  +---------+                           +---------+
//!  |encrypted|                           |encrypted| expand(truncated pn)
//!  +----+----+                           +----+----+
//!       | apply header protection             | decrypt(pn, header)
//!       v                                     v
//!  +---------+                           +---------+
//!  |protected|                           |cleartext|
//!  +---------+                           +---------+
//! ```

use alloc::boxed::Box;
use core::fmt;

mod error;
pub mod header_protection;
pub mod tls;

pub use error::*;
pub use header_protection::{HeaderProtectionMask, HEADER_PROTECTION_MASK_LEN};

/// A packet protection key for a single direction of one encryption level
pub trait Key: Send {
    /// Decrypts `payload` in place
    ///
    /// `payload` includes the trailing authentication tag. On success the first
    /// `payload.len() - tag_len()` bytes hold the cleartext.
    fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), CryptoError>;

    /// Encrypts `payload` in place
    ///
    /// The last `tag_len()` bytes of `payload` are reserved for the tag.
    fn encrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), CryptoError>;

    /// Length of the appended tag
    fn tag_len(&self) -> usize;

    /// Derives a header protection mask from a ciphertext sample
    fn header_protection_mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask;

    /// Returns the number of ciphertext bytes needed to derive a mask
    fn header_protection_sample_len(&self) -> usize;
}

/// The keys for one encryption level
pub struct Keys {
    pub sealer: Box<dyn Key>,
    pub opener: Box<dyn Key>,
}

impl Keys {
    #[inline]
    pub fn new<S: Key + 'static, O: Key + 'static>(sealer: S, opener: O) -> Self {
        Self {
            sealer: Box::new(sealer),
            opener: Box::new(opener),
        }
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("sealer_tag_len", &self.sealer.tag_len())
            .field("opener_tag_len", &self.opener.tag_len())
            .finish()
    }
}
