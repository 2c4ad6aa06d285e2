// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use bolero::check;
use sluice_codec::{assert_codec_round_trip_bytes, assert_codec_round_trip_value, DecoderBuffer, EncoderBuffer};

#[test]
fn round_trip() {
    check!().for_each(|input: &[u8]| {
        for value in assert_codec_round_trip_bytes!(VarInt, input) {
            let _ = value.checked_add(value);
            let _ = value.checked_sub(value);
            let _ = value.checked_mul(value);
            let _ = value.saturating_add(value);
            let _ = value.saturating_sub(value);
        }
    });
}

#[test]
fn encoding_size_boundaries() {
    for (value, len) in [
        (0u64, 1usize),
        (63, 1),
        (64, 2),
        (16_383, 2),
        (16_384, 4),
        (1_073_741_823, 4),
        (1_073_741_824, 8),
        (MAX_VARINT_VALUE, 8),
    ] {
        let value = VarInt::new(value).unwrap();
        assert_eq!(value.encoding_size(), len, "{value}");
        assert_eq!(assert_codec_round_trip_value!(VarInt, value).len(), len);
    }

    assert_eq!(VarInt::new(MAX_VARINT_VALUE + 1), Err(VarIntError));
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-A.1
//# For example, the eight-byte sequence 0xc2197c5eff14e88c decodes to
//# the decimal value 151,288,809,941,952,652; the four-byte sequence
//# 0x9d7f3e7d decodes to 494,878,333; the two-byte sequence 0x7bbd
//# decodes to 15,293; and the single byte 0x25 decodes to 37 (as does
//# the two-byte sequence 0x4025).

macro_rules! sequence_test {
    ($name:ident($input:expr, $expected:expr)) => {
        #[test]
        fn $name() {
            let input = $input;
            let expected = VarInt::new($expected).unwrap();
            let actual_bytes = assert_codec_round_trip_value!(VarInt, expected);
            assert_eq!(&input[..], &actual_bytes[..]);
        }
    };
}

sequence_test!(eight_byte_sequence_test(
    hex_literal::hex!("c2197c5eff14e88c"),
    151_288_809_941_952_652
));
sequence_test!(four_byte_sequence_test(hex_literal::hex!("9d7f3e7d"), 494_878_333));
sequence_test!(two_byte_sequence_test(hex_literal::hex!("7bbd"), 15_293));
sequence_test!(one_byte_sequence_test(hex_literal::hex!("25"), 37));

#[test]
fn two_byte_sequence_single_byte_value_test() {
    let input = hex_literal::hex!("4025");
    let (value, remaining) = DecoderBuffer::new(&input).decode::<VarInt>().unwrap();
    assert_eq!(value, VarInt::from_u8(37));
    assert!(remaining.is_empty());
}

#[test]
fn encode_updated_test() {
    let mut buffer = [0u8; 8];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    let placeholder = VarInt::from_u16(1 << 14);
    encoder.encode(&placeholder);

    for replacement in [0u32, 1 << 14, 1 << 29] {
        encoder.set_position(0);
        placeholder.encode_updated(VarInt::from_u32(replacement), &mut encoder);
        assert_eq!(encoder.position(), 4);
        let (actual, _) = DecoderBuffer::new(encoder.as_slice())
            .decode::<VarInt>()
            .unwrap();
        assert_eq!(actual, VarInt::from_u32(replacement));
    }
}
