// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Long and short header packet codec

pub mod decoding;
pub mod encoding;
pub mod number;

pub use decoding::{decode, CleartextPacket, ProtectedPacket};
pub use encoding::PacketEncoder;
pub use number::{PacketNumberLen, PacketNumberSpace};

//= https://www.rfc-editor.org/rfc/rfc9000#section-15
//# The version 0x00000001 is reserved for the protocol defined in this document

/// The only QUIC version this implementation speaks
pub const VERSION: u32 = 0x0000_0001;

//= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
//# A client MUST expand the payload of all UDP datagrams carrying Initial
//# packets to at least the smallest allowed maximum datagram size of
//# 1200 bytes

pub const MIN_INITIAL_DATAGRAM_SIZE: usize = 1200;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# Header Form:  The most significant bit (0x80) of byte 0 (the first
//#    byte) is set to 1 for long headers.
//#
//# Fixed Bit:  The next bit (0x40) of byte 0 is set to 1, unless the
//#    packet is a Version Negotiation packet.

pub(crate) const LONG_HEADER_FORM: u8 = 0x80;
pub(crate) const FIXED_BIT: u8 = 0x40;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# | Type | Name      | Section        |
//# +------+-----------+----------------+
//# | 0x00 | Initial   | Section 17.2.2 |
//# | 0x01 | 0-RTT     | Section 17.2.3 |
//# | 0x02 | Handshake | Section 17.2.4 |
//# | 0x03 | Retry     | Section 17.2.5 |

pub(crate) const PACKET_TYPE_MASK: u8 = 0x30;
pub(crate) const PACKET_TYPE_OFFSET: u8 = 4;
pub(crate) const PACKET_TYPE_INITIAL: u8 = 0x00;
pub(crate) const PACKET_TYPE_HANDSHAKE: u8 = 0x02;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
//# Reserved Bits:  Two bits (those with a mask of 0x0c) of byte 0 are
//#    reserved across multiple packet types.

pub(crate) const LONG_RESERVED_BITS_MASK: u8 = 0x0c;

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
//# Reserved Bits:  The next two bits (those with a mask of 0x18) of byte
//#    0 are reserved.

pub(crate) const SHORT_RESERVED_BITS_MASK: u8 = 0x18;
