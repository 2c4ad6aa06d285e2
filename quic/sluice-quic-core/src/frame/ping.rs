// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use sluice_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.2
//# Endpoints can use PING frames (type=0x01) to verify that their peers
//# are still alive or to check reachability to the peer.

pub const TAG: u8 = 0x01;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Ping;

impl Ping {
    pub const fn tag(&self) -> u8 {
        TAG
    }
}

decoder_parameterized_value!(
    impl<'a> Ping {
        fn decode(_tag: crate::frame::Tag, buffer: Buffer) -> Result<Self> {
            Ok((Ping, buffer))
        }
    }
);

impl EncoderValue for Ping {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&TAG);
    }
}
