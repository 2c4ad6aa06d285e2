// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use sluice_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.8
//# STREAM frames implicitly create a stream and carry stream data.  The
//# Type field in the STREAM frame takes the form 0b00001XXX (or the set
//# of values from 0x08 to 0x0f).

pub const STREAM_TAG: u8 = 0x08;
pub const STREAM_TAG_MAX: u8 = 0x0f;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.8
//# *  The OFF bit (0x04) in the frame type is set to indicate that there
//#    is an Offset field present.
//#
//# *  The LEN bit (0x02) in the frame type is set to indicate that there
//#    is a Length field present.  If this bit is set to 0, the Length
//#    field is absent and the Stream Data field extends to the end of
//#    the packet.
//#
//# *  The FIN bit (0x01) indicates that the frame marks the end of the
//#    stream.

const OFF_BIT: u8 = 0x04;
const LEN_BIT: u8 = 0x02;
const FIN_BIT: u8 = 0x01;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stream<Data> {
    pub stream_id: VarInt,
    /// The byte offset in the stream for the data in this frame
    pub offset: VarInt,
    /// If true, the frame omits its Length and extends to the end of the packet
    pub is_last_frame: bool,
    /// If true, the frame marks the end of the stream
    pub is_fin: bool,
    pub data: Data,
}

impl<Data> Stream<Data> {
    pub fn tag(&self) -> u8 {
        let mut tag = STREAM_TAG;

        if *self.offset != 0 {
            tag |= OFF_BIT;
        }

        if !self.is_last_frame {
            tag |= LEN_BIT;
        }

        if self.is_fin {
            tag |= FIN_BIT;
        }

        tag
    }

    /// Returns the number of data bytes a length-prefixed frame can carry in `capacity` bytes
    #[inline]
    pub fn max_data_len(capacity: usize, stream_id: VarInt, offset: VarInt) -> usize {
        let offset_len = if *offset == 0 {
            0
        } else {
            offset.encoding_size()
        };
        super::max_data_len(capacity, 1 + stream_id.encoding_size() + offset_len)
    }
}

decoder_parameterized_value!(
    impl<'a> Stream<&'a [u8]> {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let (stream_id, buffer) = buffer.decode::<VarInt>()?;

            let (offset, buffer) = if tag & OFF_BIT == OFF_BIT {
                buffer.decode::<VarInt>()?
            } else {
                (VarInt::ZERO, buffer)
            };

            let is_last_frame = tag & LEN_BIT != LEN_BIT;
            let (data, buffer) = if is_last_frame {
                let len = buffer.len();
                buffer.decode_slice(len)?
            } else {
                buffer.decode_slice_with_len_prefix::<VarInt>()?
            };
            let data = data.into_less_safe_slice();

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.8
            //# Receipt of a frame that exceeds this limit MUST be treated as a
            //# connection error of type FRAME_ENCODING_ERROR or FLOW_CONTROL_ERROR
            sluice_codec::decoder_invariant!(
                offset.checked_add_usize(data.len()).is_some(),
                "stream offset exceeds the maximum varint"
            );

            let frame = Stream {
                stream_id,
                offset,
                is_last_frame,
                is_fin: tag & FIN_BIT == FIN_BIT,
                data,
            };

            Ok((frame, buffer))
        }
    }
);

impl<Data: EncoderValue> EncoderValue for Stream<Data> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.stream_id);

        if *self.offset != 0 {
            buffer.encode(&self.offset);
        }

        if self.is_last_frame {
            buffer.encode(&self.data);
        } else {
            buffer.encode_with_len_prefix::<VarInt, _>(&self.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, Frames};
    use bolero::check;
    use hex_literal::hex;
    use sluice_codec::DecoderBuffer;

    #[test]
    fn tag_bits_test() {
        let bytes = hex!("0f 04 05 03 616263");
        let (frame, remaining) = DecoderBuffer::new(&bytes).decode::<Frame>().unwrap();
        assert!(remaining.is_empty());
        assert_eq!(
            frame,
            Frame::Stream(Stream {
                stream_id: VarInt::from_u8(4),
                offset: VarInt::from_u8(5),
                is_last_frame: false,
                is_fin: true,
                data: &b"abc"[..],
            })
        );

        // without LEN the data extends to the end of the payload
        let bytes = hex!("08 00 616263");
        let frame = Frames::new(&bytes).next().unwrap().unwrap();
        let Frame::Stream(frame) = frame else {
            panic!("expected a stream frame");
        };
        assert!(frame.is_last_frame);
        assert_eq!(frame.data, b"abc");
    }

    #[test]
    fn max_data_len_test() {
        check!()
            .with_type::<(u16, u32, u32)>()
            .cloned()
            .for_each(|(capacity, stream_id, offset)| {
                let capacity = capacity as usize;
                let stream_id = VarInt::from_u32(stream_id);
                let offset = VarInt::from_u32(offset);
                let len = Stream::<&[u8]>::max_data_len(capacity, stream_id, offset);
                let data = vec![0u8; len];
                let frame = Stream {
                    stream_id,
                    offset,
                    is_last_frame: false,
                    is_fin: false,
                    data: &data[..],
                };
                if len > 0 {
                    assert!(frame.encoding_size() <= capacity);
                }
            });
    }

    #[test]
    fn round_trip_test() {
        let data = [1u8, 2, 3];
        let frame = Stream {
            stream_id: VarInt::from_u8(8),
            offset: VarInt::from_u32(70_000),
            is_last_frame: false,
            is_fin: false,
            data: &data[..],
        };
        let bytes = frame.encode_to_vec();
        let (decoded, _) = DecoderBuffer::new(&bytes).decode::<Frame>().unwrap();
        assert_eq!(decoded, Frame::Stream(frame));
    }
}
