// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection,
    crypto::{header_protection, CryptoError, Key},
    packet::{
        number::{self, PacketNumberSpace},
        FIXED_BIT, LONG_HEADER_FORM, LONG_RESERVED_BITS_MASK, PACKET_TYPE_HANDSHAKE,
        PACKET_TYPE_INITIAL, PACKET_TYPE_MASK, PACKET_TYPE_OFFSET, SHORT_RESERVED_BITS_MASK,
        VERSION,
    },
    varint::VarInt,
};
use bytes::{Bytes, BytesMut};
use core::fmt;
use sluice_codec::{decoder_invariant, DecoderBuffer, DecoderError};

/// A packet split out of a datagram with its header fields parsed but still protected
#[derive(Clone, PartialEq, Eq)]
pub struct ProtectedPacket {
    space: PacketNumberSpace,
    version: Option<u32>,
    destination_connection_id: connection::Id,
    source_connection_id: Option<connection::Id>,
    token: Bytes,
    pn_offset: usize,
    bytes: BytesMut,
}

impl fmt::Debug for ProtectedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedPacket")
            .field("space", &self.space)
            .field("version", &self.version)
            .field("dcid", &self.destination_connection_id)
            .field("scid", &self.source_connection_id)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ProtectedPacket {
    #[inline]
    pub fn space(&self) -> PacketNumberSpace {
        self.space
    }

    /// Returns the version of a long header packet
    #[inline]
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    #[inline]
    pub fn is_long_header(&self) -> bool {
        self.version.is_some()
    }

    #[inline]
    pub fn is_supported_version(&self) -> bool {
        self.version.map_or(true, |version| version == VERSION)
    }

    #[inline]
    pub fn destination_connection_id(&self) -> &connection::Id {
        &self.destination_connection_id
    }

    #[inline]
    pub fn source_connection_id(&self) -> Option<&connection::Id> {
        self.source_connection_id.as_ref()
    }

    /// Returns the address validation token carried by an Initial packet
    #[inline]
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Removes header protection and decrypts the payload with `key`
    ///
    /// `largest_received` is the largest packet number successfully processed in the
    /// packet's space and is used to expand the truncated packet number.
    pub fn unprotect_and_decrypt(
        self,
        key: &dyn Key,
        largest_received: Option<u64>,
    ) -> Result<CleartextPacket, Error> {
        let Self {
            space,
            destination_connection_id,
            source_connection_id,
            pn_offset,
            mut bytes,
            ..
        } = self;

        let packet_len = bytes.len();

        //= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
        //# the sampled ciphertext starts 4 bytes after the start of the Packet Number field
        let sample_offset = pn_offset + header_protection::SAMPLE_OFFSET;
        let sample_len = key.header_protection_sample_len();
        let sample = bytes
            .get(sample_offset..sample_offset + sample_len)
            .ok_or(Error::Decode(DecoderError::UnexpectedEof(sample_len)))?;
        let mask = key.header_protection_mask(sample);

        let packet_number_len = header_protection::remove(mask, &mut bytes, pn_offset);
        let header_len = pn_offset + packet_number_len.bytesize();

        let truncated = bytes[pn_offset..header_len]
            .iter()
            .fold(0u32, |acc, byte| acc << 8 | *byte as u32);
        let packet_number = number::expand(truncated, packet_number_len, largest_received);

        {
            let (header, payload) = bytes.split_at_mut(header_len);
            key.decrypt(packet_number, header, payload)?;
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
        //# An endpoint MUST treat receipt of a packet that has a non-zero value
        //# for these bits after removing both packet and header protection as
        //# a connection error of type PROTOCOL_VIOLATION.
        let reserved_bits = if bytes[0] & LONG_HEADER_FORM == LONG_HEADER_FORM {
            LONG_RESERVED_BITS_MASK
        } else {
            SHORT_RESERVED_BITS_MASK
        };
        if bytes[0] & reserved_bits != 0 {
            return Err(Error::ProtocolViolation("reserved bits are set"));
        }

        let payload_end = packet_len
            .checked_sub(key.tag_len())
            .filter(|end| *end >= header_len)
            .ok_or(Error::Decode(DecoderError::UnexpectedEof(key.tag_len())))?;
        bytes.truncate(payload_end);
        let payload = bytes.split_off(header_len).freeze();

        //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
        //# An endpoint MUST treat receipt of a packet containing no frames as a
        //# connection error of type PROTOCOL_VIOLATION.
        if payload.is_empty() {
            return Err(Error::ProtocolViolation("packet contained no frames"));
        }

        Ok(CleartextPacket {
            space,
            packet_number,
            destination_connection_id,
            source_connection_id,
            payload,
            packet_len,
        })
    }
}

/// A packet that was successfully decrypted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleartextPacket {
    pub space: PacketNumberSpace,
    pub packet_number: u64,
    pub destination_connection_id: connection::Id,
    pub source_connection_id: Option<connection::Id>,
    /// The frames carried by the packet
    pub payload: Bytes,
    /// The size of the packet on the wire
    pub packet_len: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The packet could not be parsed and should be dropped
    Decode(DecoderError),
    /// The packet failed authentication and should be dropped
    Crypto(CryptoError),
    /// The packet was authentic but breaks a protocol rule
    ProtocolViolation(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(error) => write!(f, "packet decoding failed: {error}"),
            Self::Crypto(error) => write!(f, "packet decryption failed: {error}"),
            Self::ProtocolViolation(reason) => f.write_str(reason),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<DecoderError> for Error {
    fn from(error: DecoderError) -> Self {
        Self::Decode(error)
    }
}

impl From<CryptoError> for Error {
    fn from(error: CryptoError) -> Self {
        Self::Crypto(error)
    }
}

/// Splits the first packet out of `datagram`
///
/// Returns the packet and the remaining coalesced bytes. Short header packets
/// always extend to the end of the datagram. `short_dcid_len` is the length of
/// the connection IDs the receiver issued.
///
/// Long header packets with an unknown version are returned whole, with only
/// their connection IDs parsed, so the caller can reject them.
pub fn decode(datagram: &[u8], short_dcid_len: usize) -> Result<(ProtectedPacket, &[u8]), DecoderError> {
    let buffer = DecoderBuffer::new(datagram);
    let first = buffer.peek_byte(0)?;

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
    //# Packets containing a zero value for this bit are not valid packets in this version
    //# and MUST be discarded.
    decoder_invariant!(first & FIXED_BIT == FIXED_BIT, "fixed bit is not set");

    if first & LONG_HEADER_FORM == 0 {
        let buffer = buffer.skip(1)?;
        let (dcid, _) = buffer.decode_slice(short_dcid_len)?;
        let destination_connection_id = connection::Id::try_from_bytes(dcid.as_less_safe_slice())
            .ok_or(DecoderError::InvariantViolation("invalid connection id"))?;

        let packet = ProtectedPacket {
            space: PacketNumberSpace::ApplicationData,
            version: None,
            destination_connection_id,
            source_connection_id: None,
            token: Bytes::new(),
            pn_offset: 1 + short_dcid_len,
            bytes: BytesMut::from(datagram),
        };
        return Ok((packet, &[]));
    }

    let buffer = buffer.skip(1)?;
    let (version, buffer) = buffer.decode::<u32>()?;
    let (destination_connection_id, buffer) = decode_connection_id(buffer)?;
    let (source_connection_id, buffer) = decode_connection_id(buffer)?;

    if version != VERSION {
        let packet = ProtectedPacket {
            space: PacketNumberSpace::Initial,
            version: Some(version),
            destination_connection_id,
            source_connection_id: Some(source_connection_id),
            token: Bytes::new(),
            pn_offset: datagram.len() - buffer.len(),
            bytes: BytesMut::from(datagram),
        };
        return Ok((packet, &[]));
    }

    let (space, token, buffer) = match (first & PACKET_TYPE_MASK) >> PACKET_TYPE_OFFSET {
        PACKET_TYPE_INITIAL => {
            let (token, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;
            let token = Bytes::copy_from_slice(token.as_less_safe_slice());
            (PacketNumberSpace::Initial, token, buffer)
        }
        PACKET_TYPE_HANDSHAKE => (PacketNumberSpace::Handshake, Bytes::new(), buffer),
        _ => {
            return Err(DecoderError::InvariantViolation(
                "unsupported long header packet type",
            ))
        }
    };

    let (length, buffer) = buffer.decode::<VarInt>()?;
    let length = usize::try_from(length).map_err(|_| DecoderError::LengthCapacityExceeded)?;
    let pn_offset = datagram.len() - buffer.len();
    let (_, remaining) = buffer.decode_slice(length)?;
    let packet_len = pn_offset + length;

    let packet = ProtectedPacket {
        space,
        version: Some(version),
        destination_connection_id,
        source_connection_id: Some(source_connection_id),
        token,
        pn_offset,
        bytes: BytesMut::from(&datagram[..packet_len]),
    };

    Ok((packet, remaining.into_less_safe_slice()))
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# In QUIC version 1, this value MUST NOT exceed 20 bytes.

#[inline]
fn decode_connection_id(buffer: DecoderBuffer) -> Result<(connection::Id, DecoderBuffer), DecoderError> {
    let (id, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
    let id = connection::Id::try_from_bytes(id.as_less_safe_slice())
        .ok_or(DecoderError::InvariantViolation("connection id exceeds 20 bytes"))?;
    Ok((id, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::tls::null, packet::encoding::PacketEncoder};
    use bolero::check;
    use hex_literal::hex;

    fn cid(bytes: &[u8]) -> connection::Id {
        connection::Id::try_from_bytes(bytes).unwrap()
    }

    #[test]
    fn never_panics_test() {
        check!().for_each(|datagram: &[u8]| {
            let mut datagram = datagram;
            while let Ok((packet, remaining)) = decode(datagram, 8) {
                let _ = packet.unprotect_and_decrypt(&null::Key, None);
                if remaining.len() == datagram.len() {
                    break;
                }
                datagram = remaining;
            }
        });
    }

    #[test]
    fn fixed_bit_test() {
        assert!(decode(&hex!("80 00000001 00 00"), 0).is_err());
        assert!(decode(&hex!("00 0102"), 2).is_err());
    }

    #[test]
    fn unknown_version_test() {
        let datagram = hex!("c0 ff000020 02 aabb 01 cc 0000");
        let (packet, remaining) = decode(&datagram, 8).unwrap();
        assert!(remaining.is_empty());
        assert!(!packet.is_supported_version());
        assert_eq!(packet.version(), Some(0xff00_0020));
        assert_eq!(packet.destination_connection_id().as_bytes(), &hex!("aabb"));
    }

    #[test]
    fn unsupported_type_test() {
        // a 0-RTT packet
        let datagram = hex!("d0 00000001 00 00 01 00");
        assert!(decode(&datagram, 0).is_err());
    }

    #[test]
    fn oversized_connection_id_test() {
        let mut datagram = hex!("c0 00000001 15").to_vec();
        datagram.extend_from_slice(&[0u8; 32]);
        assert!(decode(&datagram, 0).is_err());
    }

    #[test]
    fn coalesced_test() {
        let dcid = cid(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let scid = cid(&[9; 8]);

        let mut datagram = vec![];
        for (space, packet_number, frame) in [
            (PacketNumberSpace::Initial, 0, 0x01u8),
            (PacketNumberSpace::Handshake, 3, 0x01),
            (PacketNumberSpace::ApplicationData, 7, 0x1e),
        ] {
            let mut encoder =
                PacketEncoder::new(space, &dcid, &scid, &[], packet_number, None, 1200, &null::Key)
                    .unwrap();
            assert!(encoder.encode_frame(&frame));
            datagram.extend(encoder.finish(&null::Key, 0).unwrap());
        }

        let mut remaining = &datagram[..];
        let mut packets = vec![];
        while !remaining.is_empty() {
            let (packet, rest) = decode(remaining, 8).unwrap();
            assert_eq!(packet.destination_connection_id(), &dcid);
            packets.push(packet.unprotect_and_decrypt(&null::Key, None).unwrap());
            remaining = rest;
        }

        let summary: Vec<_> = packets
            .iter()
            .map(|packet| (packet.space, packet.packet_number, packet.payload[0]))
            .collect();
        assert_eq!(
            summary,
            vec![
                (PacketNumberSpace::Initial, 0, 0x01),
                (PacketNumberSpace::Handshake, 3, 0x01),
                (PacketNumberSpace::ApplicationData, 7, 0x1e),
            ]
        );
        assert_eq!(packets[0].source_connection_id, Some(scid));
        assert_eq!(packets[2].source_connection_id, None);
    }

    #[test]
    fn tampered_packet_test() {
        let dcid = cid(&[1; 8]);
        let mut encoder = PacketEncoder::new(
            PacketNumberSpace::ApplicationData,
            &dcid,
            &connection::Id::EMPTY,
            &[],
            1,
            None,
            1200,
            &null::Key,
        )
        .unwrap();
        assert!(encoder.encode_frame(&0x01u8));
        let mut datagram = encoder.finish(&null::Key, 0).unwrap();
        let last = datagram.len() - 1;
        datagram[last] ^= 0xff;

        let (packet, _) = decode(&datagram, 8).unwrap();
        assert!(matches!(
            packet.unprotect_and_decrypt(&null::Key, None),
            Err(Error::Crypto(_))
        ));
    }
}
