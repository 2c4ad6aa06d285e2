// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use sluice_codec::{decoder_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.1
//# A PADDING frame (type=0x00) has no semantic value.  PADDING frames
//# can be used to increase the size of a packet.

pub const TAG: u8 = 0x00;

/// A run of consecutive PADDING frames
///
/// Consecutive padding bytes are collapsed into a single value on decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Padding {
    pub length: usize,
}

impl Padding {
    pub const fn tag(&self) -> u8 {
        TAG
    }
}

decoder_value!(
    impl<'a> Padding {
        fn decode(buffer: Buffer) -> Result<Self> {
            let length = buffer
                .as_less_safe_slice()
                .iter()
                .take_while(|byte| **byte == TAG)
                .count();
            let buffer = buffer.skip(length)?;
            Ok((Self { length }, buffer))
        }
    }
);

impl EncoderValue for Padding {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.write_zeroes(self.length)
    }
}
