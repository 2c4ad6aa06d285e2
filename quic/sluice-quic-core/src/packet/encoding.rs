// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection,
    crypto::{header_protection, CryptoError, Key},
    packet::{
        number::{self, PacketNumberLen, PacketNumberSpace},
        FIXED_BIT, LONG_HEADER_FORM, PACKET_TYPE_HANDSHAKE, PACKET_TYPE_INITIAL,
        PACKET_TYPE_OFFSET, VERSION,
    },
    varint::VarInt,
};
use alloc::{vec, vec::Vec};
use sluice_codec::{Encoder, EncoderBuffer, EncoderValue};

/// The Length placeholder used while the payload size is unknown
///
/// Both values are the largest that fit their encoding width so any final
/// length can replace them in place.
const SHORT_LENGTH_PLACEHOLDER: VarInt = VarInt::from_u16((1 << 14) - 1);
const LONG_LENGTH_PLACEHOLDER: VarInt = VarInt::from_u32((1 << 30) - 1);

/// Builds a single protected packet
///
/// The header is written on construction; frames are appended with
/// [`Self::encode_frame`] and [`Self::finish`] pads, seals and protects the
/// packet.
#[derive(Debug)]
pub struct PacketEncoder {
    buffer: Vec<u8>,
    len: usize,
    /// The end of the usable buffer once the tag is reserved
    limit: usize,
    tag_len: usize,
    sample_len: usize,
    packet_number: u64,
    packet_number_len: PacketNumberLen,
    /// The offset and placeholder of the long header Length field
    length: Option<(usize, VarInt)>,
    pn_offset: usize,
    payload_offset: usize,
}

impl PacketEncoder {
    /// Writes the packet header into a new encoder
    ///
    /// Returns `None` when `capacity` can't fit the header, the tag and at least one byte
    /// of payload.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        space: PacketNumberSpace,
        destination_connection_id: &connection::Id,
        source_connection_id: &connection::Id,
        token: &[u8],
        packet_number: u64,
        largest_acked: Option<u64>,
        capacity: usize,
        key: &dyn Key,
    ) -> Option<Self> {
        let (truncated, packet_number_len) = number::truncate(packet_number, largest_acked);
        let tag_len = key.tag_len();

        let placeholder = if capacity < SHORT_LENGTH_PLACEHOLDER.as_u64() as usize {
            SHORT_LENGTH_PLACEHOLDER
        } else {
            LONG_LENGTH_PLACEHOLDER
        };

        let header_len = match space {
            PacketNumberSpace::ApplicationData => 1 + destination_connection_id.len(),
            _ => {
                let token_len = if space.is_initial() {
                    VarInt::try_from(token.len()).ok()?.encoding_size() + token.len()
                } else {
                    0
                };
                1 + 4
                    + 1
                    + destination_connection_id.len()
                    + 1
                    + source_connection_id.len()
                    + token_len
                    + placeholder.encoding_size()
            }
        } + packet_number_len.bytesize();

        ensure!(header_len + tag_len < capacity, None);

        let mut buffer = vec![0u8; capacity];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        let mut length = None;

        match space {
            PacketNumberSpace::ApplicationData => {
                //= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
                //# 1-RTT Packet {
                //#   Header Form (1) = 0,
                //#   Fixed Bit (1) = 1,
                //#   Spin Bit (1),
                //#   Reserved Bits (2),
                //#   Key Phase (1),
                //#   Packet Number Length (2),
                //#   Destination Connection ID (0..160),
                //#   Packet Number (8..32),
                //#   Packet Payload (8..),
                //# }
                encoder.encode(&(FIXED_BIT | packet_number_len.into_packet_tag_mask()));
                encoder.encode(destination_connection_id);
            }
            _ => {
                //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.2
                //# Initial Packet {
                //#   Header Form (1) = 1,
                //#   Fixed Bit (1) = 1,
                //#   Long Packet Type (2) = 0,
                //#   Reserved Bits (2),
                //#   Packet Number Length (2),
                //#   Version (32),
                //#   Destination Connection ID Length (8),
                //#   Destination Connection ID (0..160),
                //#   Source Connection ID Length (8),
                //#   Source Connection ID (0..160),
                //#   Token Length (i),
                //#   Token (..),
                //#   Length (i),
                //#   Packet Number (8..32),
                //#   Packet Payload (8..),
                //# }
                let packet_type = if space.is_initial() {
                    PACKET_TYPE_INITIAL
                } else {
                    PACKET_TYPE_HANDSHAKE
                };
                let tag = LONG_HEADER_FORM
                    | FIXED_BIT
                    | packet_type << PACKET_TYPE_OFFSET
                    | packet_number_len.into_packet_tag_mask();
                encoder.encode(&tag);
                encoder.encode(&VERSION);
                encoder.encode_with_len_prefix::<u8, _>(destination_connection_id);
                encoder.encode_with_len_prefix::<u8, _>(source_connection_id);
                if space.is_initial() {
                    encoder.encode_with_len_prefix::<VarInt, _>(&token);
                }
                length = Some((encoder.position(), placeholder));
                encoder.encode(&placeholder);
            }
        }

        let pn_offset = encoder.position();
        let pn_bytes = truncated.to_be_bytes();
        encoder.write_slice(&pn_bytes[pn_bytes.len() - packet_number_len.bytesize()..]);
        let payload_offset = encoder.position();
        debug_assert_eq!(payload_offset, header_len);

        Some(Self {
            buffer,
            len: payload_offset,
            limit: capacity - tag_len,
            tag_len,
            sample_len: key.header_protection_sample_len(),
            packet_number,
            packet_number_len,
            length,
            pn_offset,
            payload_offset,
        })
    }

    #[inline]
    pub fn packet_number(&self) -> u64 {
        self.packet_number
    }

    /// Returns the number of bytes still available for frames
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.limit - self.len
    }

    /// Returns the number of frame bytes written so far
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.len - self.payload_offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload_len() == 0
    }

    /// Returns the length of the protected packet if it was finished without extra padding
    #[inline]
    pub fn len(&self) -> usize {
        self.padded_payload_end(0) + self.tag_len
    }

    #[inline]
    fn padded_payload_end(&self, min_len: usize) -> usize {
        //= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
        //# To ensure that sufficient data is available for sampling, packets are
        //# padded so that the combined lengths of the encoded packet number and
        //# protected payload is at least 4 bytes longer than the sample required
        //# for header protection.
        let min_for_sample = self.pn_offset + header_protection::SAMPLE_OFFSET + self.sample_len;
        let target = min_len.max(min_for_sample).saturating_sub(self.tag_len);
        self.len.max(target.min(self.limit))
    }

    /// Appends `frame` to the payload if it fits
    #[inline]
    pub fn encode_frame<F: EncoderValue>(&mut self, frame: &F) -> bool {
        ensure!(frame.encoding_size() <= self.remaining_capacity(), false);

        let mut encoder = EncoderBuffer::new(&mut self.buffer[..self.limit]);
        encoder.set_position(self.len);
        encoder.encode(frame);
        self.len = encoder.position();
        true
    }

    /// Pads, seals and protects the packet
    ///
    /// The packet is padded so it is at least `min_len` bytes long, capped at the
    /// capacity given on construction.
    pub fn finish(mut self, key: &dyn Key, min_len: usize) -> Result<Vec<u8>, CryptoError> {
        debug_assert_eq!(self.sample_len, key.header_protection_sample_len());
        let target = self.padded_payload_end(min_len);
        if self.len < target {
            // PADDING frames are zero bytes
            self.buffer[self.len..target].fill(0);
            self.len = target;
        }

        let packet_len = self.len + self.tag_len;

        if let Some((offset, placeholder)) = self.length {
            let length = VarInt::try_from(packet_len - self.pn_offset)
                .map_err(|_| CryptoError::INTERNAL_ERROR)?;
            let mut encoder = EncoderBuffer::new(&mut self.buffer);
            encoder.set_position(offset);
            placeholder.encode_updated(length, &mut encoder);
        }

        self.buffer.truncate(packet_len);

        {
            let (header, payload) = self.buffer.split_at_mut(self.payload_offset);
            key.encrypt(self.packet_number, header, payload)?;
        }

        let sample_offset = self.pn_offset + header_protection::SAMPLE_OFFSET;
        let sample = self
            .buffer
            .get(sample_offset..sample_offset + self.sample_len)
            .ok_or(CryptoError::INTERNAL_ERROR.with_reason("packet too short to sample"))?;
        let mask = key.header_protection_mask(sample);
        header_protection::apply(mask, &mut self.buffer, self.pn_offset, self.packet_number_len);

        Ok(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::tls::null, packet::decoding::decode};

    #[test]
    fn initial_padding_test() {
        let dcid = connection::Id::try_from_bytes(&[7; 8]).unwrap();
        let scid = connection::Id::try_from_bytes(&[9; 8]).unwrap();
        let mut encoder = PacketEncoder::new(
            PacketNumberSpace::Initial,
            &dcid,
            &scid,
            &[],
            0,
            None,
            1280,
            &null::Key,
        )
        .unwrap();
        assert!(encoder.encode_frame(&0x01u8));

        let packet = encoder.finish(&null::Key, 1280).unwrap();
        assert_eq!(packet.len(), 1280);

        let (packet, remaining) = decode(&packet, 8).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(packet.len(), 1280);
        let packet = packet.unprotect_and_decrypt(&null::Key, None).unwrap();
        assert_eq!(packet.payload[0], 0x01);
        assert!(packet.payload[1..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn sample_padding_test() {
        let dcid = connection::Id::try_from_bytes(&[7; 8]).unwrap();
        let mut encoder = PacketEncoder::new(
            PacketNumberSpace::ApplicationData,
            &dcid,
            &connection::Id::EMPTY,
            &[],
            0,
            None,
            1200,
            &null::Key,
        )
        .unwrap();
        assert!(encoder.encode_frame(&0x01u8));

        // the packet number offset, the sample offset and the sample itself
        let expected = 9 + header_protection::SAMPLE_OFFSET + 16;
        assert_eq!(encoder.len(), expected);
        assert_eq!(encoder.finish(&null::Key, 0).unwrap().len(), expected);
    }

    #[test]
    fn capacity_test() {
        let dcid = connection::Id::try_from_bytes(&[7; 8]).unwrap();
        assert!(PacketEncoder::new(
            PacketNumberSpace::ApplicationData,
            &dcid,
            &connection::Id::EMPTY,
            &[],
            0,
            None,
            20,
            &null::Key,
        )
        .is_none());

        let mut encoder = PacketEncoder::new(
            PacketNumberSpace::ApplicationData,
            &dcid,
            &connection::Id::EMPTY,
            &[],
            0,
            None,
            40,
            &null::Key,
        )
        .unwrap();
        // 1 byte header, 8 byte dcid, 1 byte packet number and a 16 byte tag
        assert_eq!(encoder.remaining_capacity(), 14);
        assert!(!encoder.encode_frame(&[0u8; 15].as_slice()));
        assert!(encoder.encode_frame(&[0u8; 14].as_slice()));
        assert_eq!(encoder.remaining_capacity(), 0);
    }

    #[test]
    fn packet_number_truncation_test() {
        let dcid = connection::Id::try_from_bytes(&[7; 8]).unwrap();
        let mut encoder = PacketEncoder::new(
            PacketNumberSpace::Handshake,
            &dcid,
            &dcid,
            &[],
            0x1_0002,
            Some(0x1_0000),
            1200,
            &null::Key,
        )
        .unwrap();
        assert!(encoder.encode_frame(&0x01u8));
        let packet = encoder.finish(&null::Key, 0).unwrap();

        let (packet, _) = decode(&packet, 8).unwrap();
        let packet = packet
            .unprotect_and_decrypt(&null::Key, Some(0x1_0001))
            .unwrap();
        assert_eq!(packet.packet_number, 0x1_0002);
    }
}
