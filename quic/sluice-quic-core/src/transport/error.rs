// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    crypto::CryptoError,
    varint::{VarInt, VarIntError},
};
use core::fmt;
use sluice_codec::DecoderError;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# QUIC transport error codes and application error codes are 62-bit
//# unsigned integers.

/// A connection-level error defined by the QUIC transport
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Error {
    pub code: VarInt,
    /// The frame type that triggered the error, if known
    pub frame_type: Option<VarInt>,
    pub reason: &'static str,
}

impl Error {
    /// Creates a new `Error`
    #[inline]
    pub const fn new(code: VarInt) -> Self {
        Self {
            code,
            reason: "",
            frame_type: None,
        }
    }

    /// Updates the `Error` with the specified `frame_type`
    #[inline]
    #[must_use]
    pub const fn with_frame_type(mut self, frame_type: VarInt) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    /// Updates the `Error` with the specified `reason`
    #[inline]
    #[must_use]
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.reason.is_empty() {
            self.reason.fmt(f)
        } else if let Some(description) = self.description() {
            description.fmt(f)
        } else {
            write!(f, "transport::Error({})", self.code)
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("transport::Error");

        d.field("code", &self.code.as_u64());

        if let Some(description) = self.description() {
            d.field("description", &description);
        }

        if !self.reason.is_empty() {
            d.field("reason", &self.reason);
        }

        if let Some(frame_type) = self.frame_type {
            d.field("frame_type", &frame_type.as_u64());
        }

        d.finish()
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Internal convenience macro for defining standard error codes
macro_rules! impl_errors {
    ($($(#[doc = $doc:expr])* $name:ident = $code:literal),* $(,)?) => {
        impl Error {
            $(
                $(#[doc = $doc])*
                pub const $name: Self = Self::new(VarInt::from_u32($code));
            )*

            /// Returns the name of the code, if it is a defined transport or crypto error
            pub fn description(&self) -> Option<&'static str> {
                match self.code.as_u64() {
                    $(
                        $code => Some(stringify!($name)),
                    )*
                    code @ 0x100..=0x1ff => CryptoError::new(code as u8).description(),
                    _ => None
                }
            }
        }

        #[test]
        fn description_test() {
            $(
                assert_eq!(&Error::$name.to_string(), stringify!($name));
            )*
            assert_eq!(&Error::from(CryptoError::DECODE_ERROR).to_string(), "DECODE_ERROR");
        }
    };
}

impl_errors! {
    //= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
    //# NO_ERROR (0x00):  An endpoint uses this with CONNECTION_CLOSE to
    //#    signal that the connection is being closed abruptly in the absence
    //#    of any error.
    /// The connection is being closed abruptly in the absence of any error
    NO_ERROR = 0x0,

    /// The endpoint encountered an internal error and cannot continue with the connection
    INTERNAL_ERROR = 0x1,

    /// The server refused to accept a new connection
    CONNECTION_REFUSED = 0x2,

    //= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
    //# FLOW_CONTROL_ERROR (0x03):  An endpoint received more data than it
    //#    permitted in its advertised data limits; see Section 4.
    /// An endpoint received more data than it permitted in its advertised data limits
    FLOW_CONTROL_ERROR = 0x3,

    /// An endpoint received a frame for a stream identifier that exceeded its
    /// advertised stream limit for the corresponding stream type
    STREAM_LIMIT_ERROR = 0x4,

    /// An endpoint received a frame for a stream that was not in a state that
    /// permitted that frame
    STREAM_STATE_ERROR = 0x5,

    //= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
    //# FINAL_SIZE_ERROR (0x06):  (1) An endpoint received a STREAM frame
    //#    containing data that exceeded the previously established final
    //#    size, (2) an endpoint received a STREAM frame or a RESET_STREAM
    //#    frame containing a final size that was lower than the size of
    //#    stream data that was already received, or (3) an endpoint received
    //#    a STREAM frame or a RESET_STREAM frame containing a different
    //#    final size to the one already established.
    /// An endpoint received a frame that conflicts with an established final size
    FINAL_SIZE_ERROR = 0x6,

    /// An endpoint received a frame that was badly formatted
    FRAME_ENCODING_ERROR = 0x7,

    /// An endpoint received transport parameters that were badly formatted
    TRANSPORT_PARAMETER_ERROR = 0x8,

    /// The number of connection IDs provided by the peer exceeds the advertised limit
    CONNECTION_ID_LIMIT_ERROR = 0x9,

    /// An endpoint detected an error with protocol compliance that was not
    /// covered by more specific error codes
    PROTOCOL_VIOLATION = 0xA,

    /// A server received a client Initial that contained an invalid Token field
    INVALID_TOKEN = 0xB,

    /// The application or application protocol caused the connection to be closed
    APPLICATION_ERROR = 0xC,

    /// An endpoint has received more data in CRYPTO frames than it can buffer
    CRYPTO_BUFFER_EXCEEDED = 0xD,
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# CRYPTO_ERROR (0x0100-0x01ff):  The cryptographic handshake failed.  A
//#    range of 256 values is reserved for carrying error codes specific to
//#    the cryptographic handshake that is used.

impl Error {
    /// Creates a crypto-level `Error` from a TLS alert code.
    #[inline]
    pub const fn crypto_error(code: u8) -> Self {
        Self::new(VarInt::from_u16(0x100 | (code as u16)))
    }

    /// Returns true if the code is in the crypto error range
    #[inline]
    pub fn is_crypto_error(&self) -> bool {
        (0x100..=0x1ff).contains(&self.code.as_u64())
    }
}

impl From<DecoderError> for Error {
    #[inline]
    fn from(decoder_error: DecoderError) -> Self {
        match decoder_error {
            DecoderError::InvariantViolation(reason) => {
                Self::FRAME_ENCODING_ERROR.with_reason(reason)
            }
            _ => Self::FRAME_ENCODING_ERROR.with_reason("malformed frame"),
        }
    }
}

/// See `Error::crypto_error` for more details
impl From<CryptoError> for Error {
    #[inline]
    fn from(crypto_error: CryptoError) -> Self {
        Self::crypto_error(crypto_error.code).with_reason(crypto_error.reason)
    }
}

impl From<VarIntError> for Error {
    #[inline]
    fn from(_: VarIntError) -> Self {
        Self::INTERNAL_ERROR.with_reason("varint encoding limit exceeded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_error_test() {
        let error = Error::from(CryptoError::HANDSHAKE_FAILURE.with_reason("no shared params"));
        assert_eq!(error.code.as_u64(), 0x100 + 40);
        assert!(error.is_crypto_error());
        assert_eq!(error.to_string(), "no shared params");
        assert!(!Error::PROTOCOL_VIOLATION.is_crypto_error());
    }

    #[test]
    fn decoder_error_test() {
        let error = Error::from(DecoderError::UnexpectedEof(3));
        assert_eq!(error.code, Error::FRAME_ENCODING_ERROR.code);
        let error = Error::from(DecoderError::InvariantViolation("bad ack range"));
        assert_eq!(error.reason, "bad ack range");
    }
}
