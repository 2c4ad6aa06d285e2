// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use sluice_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.19
//# An endpoint sends a CONNECTION_CLOSE frame (type=0x1c or 0x1d) to
//# notify its peer that the connection is being closed.  The
//# CONNECTION_CLOSE frame with a type of 0x1c is used to signal errors
//# at only the QUIC layer, or the absence of errors (with the NO_ERROR
//# code).  The CONNECTION_CLOSE frame with a type of 0x1d is used to
//# signal an error with the application that uses QUIC.

pub const TRANSPORT_TAG: u8 = 0x1c;
pub const APPLICATION_TAG: u8 = 0x1d;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.19
//# CONNECTION_CLOSE Frame {
//#   Type (i) = 0x1c..0x1d,
//#   Error Code (i),
//#   [Frame Type (i)],
//#   Reason Phrase Length (i),
//#   Reason Phrase (..),
//# }

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionClose<'a> {
    pub error_code: VarInt,
    /// The type of the frame that triggered the error
    ///
    /// Present only in transport closes; a transport close for an error that
    /// wasn't caused by a frame carries zero.
    pub frame_type: Option<VarInt>,
    pub reason: &'a [u8],
}

impl<'a> ConnectionClose<'a> {
    pub const fn tag(&self) -> u8 {
        if self.frame_type.is_some() {
            TRANSPORT_TAG
        } else {
            APPLICATION_TAG
        }
    }
}

decoder_parameterized_value!(
    impl<'a> ConnectionClose<'a> {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let (error_code, buffer) = buffer.decode()?;

            let (frame_type, buffer) = if tag == TRANSPORT_TAG {
                let (frame_type, buffer) = buffer.decode()?;
                (Some(frame_type), buffer)
            } else {
                (None, buffer)
            };

            let (reason, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
            let reason = reason.into_less_safe_slice();

            let frame = ConnectionClose {
                error_code,
                frame_type,
                reason,
            };

            Ok((frame, buffer))
        }
    }
);

impl<'a> EncoderValue for ConnectionClose<'a> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.error_code);
        if let Some(frame_type) = &self.frame_type {
            buffer.encode(frame_type);
        }
        buffer.encode_with_len_prefix::<VarInt, _>(&self.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use hex_literal::hex;
    use sluice_codec::DecoderBuffer;

    #[test]
    fn transport_close_test() {
        let frame = ConnectionClose {
            error_code: VarInt::from_u8(0x0a),
            frame_type: Some(VarInt::from_u8(0x08)),
            reason: b"bad",
        };
        let bytes = frame.encode_to_vec();
        assert_eq!(bytes, hex!("1c 0a 08 03 626164"));

        let (decoded, remaining) = DecoderBuffer::new(&bytes).decode::<Frame>().unwrap();
        assert!(remaining.is_empty());
        assert_eq!(decoded, Frame::ConnectionClose(frame));
    }

    #[test]
    fn application_close_test() {
        let bytes = hex!("1d 4001 00");
        let (decoded, _) = DecoderBuffer::new(&bytes).decode::<Frame>().unwrap();
        assert_eq!(
            decoded,
            Frame::ConnectionClose(ConnectionClose {
                error_code: VarInt::from_u8(1),
                frame_type: None,
                reason: &[],
            })
        );
    }
}
