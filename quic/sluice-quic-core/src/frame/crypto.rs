// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use sluice_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# A CRYPTO frame (type=0x06) is used to transmit cryptographic
//# handshake messages.
//#
//# CRYPTO Frame {
//#   Type (i) = 0x06,
//#   Offset (i),
//#   Length (i),
//#   Crypto Data (..),
//# }

pub const TAG: u8 = 0x06;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Crypto<Data> {
    /// The byte offset in the stream for the data in this frame
    pub offset: VarInt,
    pub data: Data,
}

impl<Data> Crypto<Data> {
    pub const fn tag(&self) -> u8 {
        TAG
    }

    /// Returns the number of data bytes a frame at `offset` can carry in `capacity` bytes
    #[inline]
    pub fn max_data_len(capacity: usize, offset: VarInt) -> usize {
        super::max_data_len(capacity, 1 + offset.encoding_size())
    }
}

decoder_parameterized_value!(
    impl<'a> Crypto<&'a [u8]> {
        fn decode(_tag: Tag, buffer: Buffer) -> Result<Self> {
            let (offset, buffer) = buffer.decode::<VarInt>()?;
            let (data, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
            let data = data.into_less_safe_slice();

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
            //# The largest offset delivered on a stream -- the sum of the offset and
            //# data length -- cannot exceed 2^62-1.
            sluice_codec::decoder_invariant!(
                offset.checked_add_usize(data.len()).is_some(),
                "crypto offset exceeds the maximum varint"
            );

            let frame = Crypto { offset, data };

            Ok((frame, buffer))
        }
    }
);

impl<Data: EncoderValue> EncoderValue for Crypto<Data> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&TAG);
        buffer.encode(&self.offset);
        buffer.encode_with_len_prefix::<VarInt, _>(&self.data);
    }
}
