// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUIC frame codec
//!
//! Every frame implements [`EncoderValue`], including its type byte, and is
//! decoded through [`Frame`] which dispatches on the frame type.

use crate::{packet::number::PacketNumberSpace, transport, varint::VarInt};
use core::fmt;
use sluice_codec::{decoder_value, DecoderBuffer, DecoderError, Encoder, EncoderValue};

pub(crate) type Tag = u8;

/// Implements the codec for frames made only of `VarInt` fields
macro_rules! simple_frame_codec {
    ($name:ident { $($field:ident),* }, $tag:expr) => {
        sluice_codec::decoder_parameterized_value!(
            impl<'a> $name {
                fn decode(_tag: crate::frame::Tag, buffer: Buffer) -> Result<Self> {
                    $(
                        let ($field, buffer) = buffer.decode()?;
                    )*

                    let frame = $name { $($field),* };

                    Ok((frame, buffer))
                }
            }
        );

        impl sluice_codec::EncoderValue for $name {
            #[inline]
            fn encode<E: sluice_codec::Encoder>(&self, buffer: &mut E) {
                buffer.encode(&$tag);
                $(
                    buffer.encode(&self.$field);
                )*
            }
        }
    };
}

pub mod ack;
pub mod connection_close;
pub mod crypto;
pub mod data_blocked;
pub mod handshake_done;
pub mod max_data;
pub mod max_stream_data;
pub mod max_streams;
pub mod padding;
pub mod ping;
pub mod reset_stream;
pub mod stop_sending;
pub mod stream;
pub mod stream_data_blocked;
pub mod streams_blocked;

pub use ack::{Ack, AckRanges, AckRangesDecoder};
pub use connection_close::ConnectionClose;
pub use crypto::Crypto;
pub use data_blocked::DataBlocked;
pub use handshake_done::HandshakeDone;
pub use max_data::MaxData;
pub use max_stream_data::MaxStreamData;
pub use max_streams::MaxStreams;
pub use padding::Padding;
pub use ping::Ping;
pub use reset_stream::ResetStream;
pub use stop_sending::StopSending;
pub use stream::Stream;
pub use stream_data_blocked::StreamDataBlocked;
pub use streams_blocked::StreamsBlocked;

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
//# | Type Value  | Frame Type Name      | Definition     | Pkts | Spec |
//# | 0x00        | PADDING              | Section 19.1   | IH01 | NP   |
//# | 0x01        | PING                 | Section 19.2   | IH01 |      |
//# | 0x02-0x03   | ACK                  | Section 19.3   | IH_1 | NC   |
//# | 0x04        | RESET_STREAM         | Section 19.4   | __01 |      |
//# | 0x05        | STOP_SENDING         | Section 19.5   | __01 |      |
//# | 0x06        | CRYPTO               | Section 19.6   | IH_1 |      |
//# | 0x07        | NEW_TOKEN            | Section 19.7   | ___1 |      |
//# | 0x08-0x0f   | STREAM               | Section 19.8   | __01 | F    |
//# | 0x10        | MAX_DATA             | Section 19.9   | __01 |      |
//# | 0x11        | MAX_STREAM_DATA      | Section 19.10  | __01 |      |
//# | 0x12-0x13   | MAX_STREAMS          | Section 19.11  | __01 |      |
//# | 0x14        | DATA_BLOCKED         | Section 19.12  | __01 |      |
//# | 0x15        | STREAM_DATA_BLOCKED  | Section 19.13  | __01 |      |
//# | 0x16-0x17   | STREAMS_BLOCKED      | Section 19.14  | __01 |      |
//# | 0x18        | NEW_CONNECTION_ID    | Section 19.15  | __01 | P    |
//# | 0x19        | RETIRE_CONNECTION_ID | Section 19.16  | __01 |      |
//# | 0x1a        | PATH_CHALLENGE       | Section 19.17  | __01 | P    |
//# | 0x1b        | PATH_RESPONSE        | Section 19.18  | ___1 | P    |
//# | 0x1c-0x1d   | CONNECTION_CLOSE     | Section 19.19  | ih01 | N    |
//# | 0x1e        | HANDSHAKE_DONE       | Section 19.20  | ___1 |      |

/// A decoded frame borrowing from the packet payload
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Padding(Padding),
    Ping(Ping),
    Ack(Ack<AckRangesDecoder<'a>>),
    ResetStream(ResetStream),
    StopSending(StopSending),
    Crypto(Crypto<&'a [u8]>),
    Stream(Stream<&'a [u8]>),
    MaxData(MaxData),
    MaxStreamData(MaxStreamData),
    MaxStreams(MaxStreams),
    DataBlocked(DataBlocked),
    StreamDataBlocked(StreamDataBlocked),
    StreamsBlocked(StreamsBlocked),
    ConnectionClose(ConnectionClose<'a>),
    HandshakeDone(HandshakeDone),
}

impl<'a> Frame<'a> {
    pub fn tag(&self) -> Tag {
        match self {
            Frame::Padding(frame) => frame.tag(),
            Frame::Ping(frame) => frame.tag(),
            Frame::Ack(frame) => frame.tag(),
            Frame::ResetStream(frame) => frame.tag(),
            Frame::StopSending(frame) => frame.tag(),
            Frame::Crypto(frame) => frame.tag(),
            Frame::Stream(frame) => frame.tag(),
            Frame::MaxData(frame) => frame.tag(),
            Frame::MaxStreamData(frame) => frame.tag(),
            Frame::MaxStreams(frame) => frame.tag(),
            Frame::DataBlocked(frame) => frame.tag(),
            Frame::StreamDataBlocked(frame) => frame.tag(),
            Frame::StreamsBlocked(frame) => frame.tag(),
            Frame::ConnectionClose(frame) => frame.tag(),
            Frame::HandshakeDone(frame) => frame.tag(),
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2
    //# Packets containing only ACK, PADDING, and CONNECTION_CLOSE frames are
    //# not ack-eliciting

    #[inline]
    pub fn is_ack_eliciting(&self) -> bool {
        !matches!(
            self,
            Frame::Padding(_) | Frame::Ack(_) | Frame::ConnectionClose(_)
        )
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
    //# An endpoint MUST treat receipt of a frame in a packet type that is not
    //# permitted as a connection error of type PROTOCOL_VIOLATION.

    /// Returns `true` if the frame may be carried in a packet of `space`
    pub fn is_allowed_in(&self, space: PacketNumberSpace) -> bool {
        if space.is_application_data() {
            return true;
        }

        match self {
            Frame::Padding(_) | Frame::Ping(_) | Frame::Ack(_) | Frame::Crypto(_) => true,
            Frame::ConnectionClose(frame) => frame.frame_type.is_some(),
            _ => false,
        }
    }
}

decoder_value!(
    impl<'a> Frame<'a> {
        fn decode(buffer: Buffer) -> Result<Self> {
            let tag = buffer.peek_byte(0)?;

            // all supported frame types fit in a single byte varint
            sluice_codec::decoder_invariant!(tag < 0x40, "unsupported frame type");

            macro_rules! frame {
                ($variant:ident) => {{
                    let buffer = buffer.skip(1)?;
                    let (frame, buffer) = buffer.decode_parameterized(tag)?;
                    Ok((Frame::$variant(frame), buffer))
                }};
            }

            match tag {
                padding::TAG => {
                    let (frame, buffer) = buffer.decode()?;
                    Ok((Frame::Padding(frame), buffer))
                }
                ping::TAG => frame!(Ping),
                ack::ACK_TAG | ack::ACK_W_ECN_TAG => frame!(Ack),
                reset_stream::TAG => frame!(ResetStream),
                stop_sending::TAG => frame!(StopSending),
                crypto::TAG => frame!(Crypto),
                stream::STREAM_TAG..=stream::STREAM_TAG_MAX => frame!(Stream),
                max_data::TAG => frame!(MaxData),
                max_stream_data::TAG => frame!(MaxStreamData),
                max_streams::BIDI_TAG | max_streams::UNI_TAG => frame!(MaxStreams),
                data_blocked::TAG => frame!(DataBlocked),
                stream_data_blocked::TAG => frame!(StreamDataBlocked),
                streams_blocked::BIDI_TAG | streams_blocked::UNI_TAG => frame!(StreamsBlocked),
                connection_close::TRANSPORT_TAG | connection_close::APPLICATION_TAG => {
                    frame!(ConnectionClose)
                }
                handshake_done::TAG => frame!(HandshakeDone),
                _ => Err(DecoderError::InvariantViolation("unsupported frame type")),
            }
        }
    }
);

impl<'a> EncoderValue for Frame<'a> {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        match self {
            Frame::Padding(frame) => buffer.encode(frame),
            Frame::Ping(frame) => buffer.encode(frame),
            Frame::Ack(frame) => buffer.encode(frame),
            Frame::ResetStream(frame) => buffer.encode(frame),
            Frame::StopSending(frame) => buffer.encode(frame),
            Frame::Crypto(frame) => buffer.encode(frame),
            Frame::Stream(frame) => buffer.encode(frame),
            Frame::MaxData(frame) => buffer.encode(frame),
            Frame::MaxStreamData(frame) => buffer.encode(frame),
            Frame::MaxStreams(frame) => buffer.encode(frame),
            Frame::DataBlocked(frame) => buffer.encode(frame),
            Frame::StreamDataBlocked(frame) => buffer.encode(frame),
            Frame::StreamsBlocked(frame) => buffer.encode(frame),
            Frame::ConnectionClose(frame) => buffer.encode(frame),
            Frame::HandshakeDone(frame) => buffer.encode(frame),
        }
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
//# An endpoint MUST treat the receipt of a frame of unknown type as a
//# connection error of type FRAME_ENCODING_ERROR.

/// Iterates over the frames of a decrypted packet payload
///
/// A frame that can't be decoded ends the iteration with a `FRAME_ENCODING_ERROR`
/// naming the offending frame type.
#[derive(Clone, Copy)]
pub struct Frames<'a> {
    buffer: DecoderBuffer<'a>,
}

impl<'a> Frames<'a> {
    #[inline]
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            buffer: DecoderBuffer::new(payload),
        }
    }
}

impl<'a> fmt::Debug for Frames<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(*self).finish()
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Frame<'a>, transport::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.buffer.peek_byte(0).ok()?;

        match self.buffer.decode::<Frame>() {
            Ok((frame, remaining)) => {
                self.buffer = remaining;
                Some(Ok(frame))
            }
            Err(error) => {
                self.buffer = DecoderBuffer::new(&[]);
                let reason: &'static str = error.into();
                Some(Err(transport::Error::FRAME_ENCODING_ERROR
                    .with_frame_type(VarInt::from_u8(tag))
                    .with_reason(reason)))
            }
        }
    }
}

/// Returns the largest number of data bytes a frame with a length prefix can carry in `capacity`
#[inline]
pub(crate) fn max_data_len(capacity: usize, header_len: usize) -> usize {
    let remaining = capacity.saturating_sub(header_len);
    let len_prefix = VarInt::try_from(remaining).map_or(8, |len| len.encoding_size());
    remaining.saturating_sub(len_prefix)
}
