// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::packet::number::PacketNumberLen;

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# The output of this algorithm is a 5 byte mask that is applied to the
//# protected header fields using exclusive OR.

pub const HEADER_PROTECTION_MASK_LEN: usize = 5;
pub type HeaderProtectionMask = [u8; HEADER_PROTECTION_MASK_LEN];

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# Figure 6 shows a sample algorithm for applying header protection.
//# Removing header protection only differs in the order in which the
//# packet number length (pn_length) is determined (here "^" is used to
//# represent exclusive OR).
//#
//# mask = header_protection(hp_key, sample)
//#
//# pn_length = (packet[0] & 0x03) + 1
//# if (packet[0] & 0x80) == 0x80:
//# # Long header: 4 bits masked
//# packet[0] ^= mask[0] & 0x0f
//# else:
//# # Short header: 5 bits masked
//# packet[0] ^= mask[0] & 0x1f
//#
//# # pn_offset is the start of the Packet Number field.
//# packet[pn_offset:pn_offset+pn_length] ^= mask[1:1+pn_length]

const LONG_HEADER_TAG: u8 = 0x80;
pub(crate) const LONG_HEADER_MASK: u8 = 0x0f;
pub(crate) const SHORT_HEADER_MASK: u8 = 0x1f;

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
//# in sampling packet ciphertext for header protection, the Packet Number field is
//# assumed to be 4 bytes long

/// The distance from the start of the packet number to the header protection sample
pub const SAMPLE_OFFSET: usize = 4;

#[inline(always)]
fn mask_from_packet_tag(tag: u8) -> u8 {
    if tag & LONG_HEADER_TAG == LONG_HEADER_TAG {
        LONG_HEADER_MASK
    } else {
        SHORT_HEADER_MASK
    }
}

#[inline(always)]
fn xor_mask(packet_number: &mut [u8], mask: &HeaderProtectionMask) {
    for (byte, mask_byte) in packet_number.iter_mut().zip(&mask[1..]) {
        *byte ^= mask_byte;
    }
}

/// Protects the first byte and the packet number of an encrypted packet
///
/// The caller ensures `packet` extends at least `packet_number_len` bytes past `pn_offset`.
#[inline]
pub fn apply(
    mask: HeaderProtectionMask,
    packet: &mut [u8],
    pn_offset: usize,
    packet_number_len: PacketNumberLen,
) {
    packet[0] ^= mask[0] & mask_from_packet_tag(packet[0]);
    let packet_number = &mut packet[pn_offset..pn_offset + packet_number_len.bytesize()];
    xor_mask(packet_number, &mask);
}

/// Removes header protection and returns the now visible packet number length
///
/// The caller ensures `packet` extends at least 4 bytes past `pn_offset`.
#[inline]
pub fn remove(mask: HeaderProtectionMask, packet: &mut [u8], pn_offset: usize) -> PacketNumberLen {
    packet[0] ^= mask[0] & mask_from_packet_tag(packet[0]);
    let packet_number_len = PacketNumberLen::from_packet_tag(packet[0]);
    let packet_number = &mut packet[pn_offset..pn_offset + packet_number_len.bytesize()];
    xor_mask(packet_number, &mask);
    packet_number_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_test() {
        let mask = [0xff, 0x11, 0x22, 0x33, 0x44];

        for first in [0xc1u8, 0x41] {
            let mut packet = [first, 9, 9, 0xaa, 0xbb, 0, 0, 0, 0];
            let original = packet;
            let len = PacketNumberLen::from_packet_tag(first);

            apply(mask, &mut packet, 3, len);
            assert_ne!(packet, original);

            let removed_len = remove(mask, &mut packet, 3);
            assert_eq!(removed_len, len);
            assert_eq!(packet, original);
        }
    }

    #[test]
    fn long_header_form_bit_test() {
        let mask = [0xff; 5];
        let mut packet = [0xc0u8, 0, 0, 0, 0];
        apply(mask, &mut packet, 1, PacketNumberLen::from_packet_tag(0));
        // only the low four bits are protected in long headers
        assert_eq!(packet[0] & 0xf0, 0xc0);

        let mut packet = [0x40u8, 0, 0, 0, 0];
        apply(mask, &mut packet, 1, PacketNumberLen::from_packet_tag(0));
        assert_eq!(packet[0] & 0xe0, 0x40);
    }
}
