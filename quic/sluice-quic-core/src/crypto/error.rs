// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;
use sluice_codec::DecoderError;

/// Error type for crypto-related errors
///
/// `code` is a TLS alert value; it is mapped into the transport error space
/// as `0x100 | code`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CryptoError {
    pub reason: &'static str,
    pub code: u8,
}

impl CryptoError {
    #[inline]
    pub const fn new(code: u8) -> Self {
        Self { reason: "", code }
    }

    /// Sets the reason for `CryptoError`
    #[inline]
    #[must_use]
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Debug for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("CryptoError");
        d.field("code", &self.code);
        if let Some(description) = self.description() {
            d.field("description", &description);
        }
        if !self.reason.is_empty() {
            d.field("reason", &self.reason);
        }
        d.finish()
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.reason.is_empty() {
            self.reason.fmt(f)
        } else if let Some(description) = self.description() {
            description.fmt(f)
        } else {
            write!(f, "CryptoError({})", self.code)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CryptoError {}

impl From<DecoderError> for CryptoError {
    #[inline]
    fn from(_: DecoderError) -> Self {
        Self::DECODE_ERROR
    }
}

macro_rules! alerts {
    ($($name:ident = $code:literal),* $(,)?) => {
        impl CryptoError {
            $(
                pub const $name: Self = Self::new($code);
            )*

            /// Returns the alert name for the code, if known
            pub fn description(&self) -> Option<&'static str> {
                match self.code {
                    $(
                        $code => Some(stringify!($name)),
                    )*
                    _ => None,
                }
            }
        }
    };
}

//= https://www.rfc-editor.org/rfc/rfc8446#appendix-B.2
//# enum {
//#     close_notify(0),
//#     unexpected_message(10),
//#     handshake_failure(40),
//#     illegal_parameter(47),
//#     decode_error(50),
//#     decrypt_error(51),
//#     protocol_version(70),
//#     internal_error(80),
//#     missing_extension(109),
alerts! {
    CLOSE_NOTIFY = 0,
    UNEXPECTED_MESSAGE = 10,
    HANDSHAKE_FAILURE = 40,
    ILLEGAL_PARAMETER = 47,
    DECODE_ERROR = 50,
    DECRYPT_ERROR = 51,
    PROTOCOL_VERSION = 70,
    INTERNAL_ERROR = 80,
    MISSING_EXTENSION = 109,
}
