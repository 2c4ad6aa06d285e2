// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet number spaces and the truncated packet number encoding

use core::fmt;

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# Packet numbers are divided into three spaces in QUIC:
//#
//# Initial space:  All Initial packets (Section 17.2.2) are in this
//#    space.
//#
//# Handshake space:  All Handshake packets (Section 17.2.4) are in this
//#    space.
//#
//# Application data space:  All 0-RTT (Section 17.2.3) and 1-RTT
//#    (Section 17.3.1) packets are in this space.

/// Contains all of the available packet spaces for QUIC packets
///
/// Each space also identifies the encryption level of the packets in it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketNumberSpace {
    #[default]
    Initial,
    Handshake,
    ApplicationData,
}

impl fmt::Display for PacketNumberSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::Handshake => f.write_str("handshake"),
            Self::ApplicationData => f.write_str("application_data"),
        }
    }
}

impl PacketNumberSpace {
    pub const ALL: [Self; 3] = [Self::Initial, Self::Handshake, Self::ApplicationData];

    #[inline]
    pub fn is_initial(self) -> bool {
        matches!(self, Self::Initial)
    }

    #[inline]
    pub fn is_handshake(self) -> bool {
        matches!(self, Self::Handshake)
    }

    #[inline]
    pub fn is_application_data(self) -> bool {
        matches!(self, Self::ApplicationData)
    }

    /// Returns the position of the space in `ALL`
    #[inline]
    pub const fn as_index(self) -> usize {
        self as usize
    }
}

/// The number of bytes used to encode a truncated packet number
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketNumberLen(u8);

impl PacketNumberLen {
    /// Reads the length from the two low bits of an unprotected first byte
    #[inline]
    pub const fn from_packet_tag(tag: u8) -> Self {
        Self((tag & 0x03) + 1)
    }

    #[inline]
    pub const fn into_packet_tag_mask(self) -> u8 {
        self.0 - 1
    }

    #[inline]
    pub const fn bytesize(self) -> usize {
        self.0 as usize
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.2
//# the sender MUST use a packet number size able to represent more than
//# twice as large a range as the difference between the largest
//# acknowledged packet number and the packet number that is being sent.

/// Truncates `packet_number` for the wire, given the largest packet number the peer acknowledged
#[inline]
pub fn truncate(packet_number: u64, largest_acked: Option<u64>) -> (u32, PacketNumberLen) {
    let num_unacked = match largest_acked {
        Some(largest_acked) => packet_number.saturating_sub(largest_acked),
        None => packet_number + 1,
    };

    let min_bits = 64 - num_unacked.leading_zeros() + 1;
    let num_bytes = ((min_bits + 7) / 8).clamp(1, 4) as u8;
    let mask = (1u64 << (num_bytes as u32 * 8)) - 1;

    ((packet_number & mask) as u32, PacketNumberLen(num_bytes))
}

//= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.3
//# DecodePacketNumber(largest_pn, truncated_pn, pn_nbits):
//#   expected_pn  = largest_pn + 1
//#   pn_win       = 1 << pn_nbits
//#   pn_hwin      = pn_win / 2
//#   pn_mask      = pn_win - 1
//#   // The incoming packet number should be greater than
//#   // expected_pn - pn_hwin and less than or equal to
//#   // expected_pn + pn_hwin
//#   //
//#   // This means we cannot just strip the trailing bits from
//#   // expected_pn and add the truncated_pn because that might
//#   // yield a value outside the window.
//#   //
//#   // The following code calculates a candidate value and
//#   // makes sure it's within the packet number window.
//#   // Note the extra checks to prevent overflow and underflow.
//#   candidate_pn = (expected_pn & ~pn_mask) | truncated_pn
//#   if candidate_pn <= expected_pn - pn_hwin and
//#      candidate_pn < (1 << 62) - pn_win:
//#      return candidate_pn + pn_win
//#   if candidate_pn > expected_pn + pn_hwin and
//#      candidate_pn >= pn_win:
//#      return candidate_pn - pn_win
//#   return candidate_pn

/// Recovers the full packet number from its truncated form and the largest packet number received
#[inline]
pub fn expand(truncated: u32, len: PacketNumberLen, largest_received: Option<u64>) -> u64 {
    let expected = largest_received.map_or(0, |largest| largest + 1);
    let window = 1u64 << (len.bytesize() * 8);
    let half_window = window / 2;
    let mask = window - 1;

    let candidate = (expected & !mask) | truncated as u64;

    if candidate.saturating_add(half_window) <= expected && candidate < (1u64 << 62) - window {
        candidate + window
    } else if candidate > expected + half_window && candidate >= window {
        candidate - window
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    #[test]
    fn rfc_example_test() {
        //= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.3
        //# For example, if the highest successfully authenticated packet had a
        //# packet number of 0xa82f30ea, then a packet containing a 16-bit value
        //# of 0x9b32 will be decoded as 0xa82f9b32.
        let len = PacketNumberLen::from_packet_tag(0b01);
        assert_eq!(expand(0x9b32, len, Some(0xa82f30ea)), 0xa82f9b32);
    }

    #[test]
    fn truncate_len_test() {
        //= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.2
        //# For example, if an endpoint has received an acknowledgment for packet
        //# 0xabe8b3 and is sending a packet with a number of 0xac5c02, there are
        //# 29,519 (0x734f) outstanding packet numbers.  In order to represent at
        //# least twice this range (59,038 packets, or 0xe69e), 16 bits are
        //# required.
        let (truncated, len) = truncate(0xac5c02, Some(0xabe8b3));
        assert_eq!(len.bytesize(), 2);
        assert_eq!(truncated, 0x5c02);

        assert_eq!(truncate(0, None).1.bytesize(), 1);
        assert_eq!(truncate(1 << 40, Some(0)).1.bytesize(), 4);
    }

    #[test]
    fn round_trip_test() {
        check!()
            .with_type::<(u32, u16)>()
            .cloned()
            .for_each(|(largest_acked, distance)| {
                let largest_acked = largest_acked as u64;
                let packet_number = largest_acked + 1 + distance as u64;
                let (truncated, len) = truncate(packet_number, Some(largest_acked));
                // the receiver has seen at least everything the peer acknowledged
                let expanded = expand(truncated, len, Some(largest_acked));
                assert_eq!(expanded, packet_number);
            });
    }
}
