// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use core::{convert::TryInto, time::Duration};

/// Settings for ACK generation and ACK frame encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// The maximum ACK delay indicates the maximum amount of time by which the
    /// endpoint will delay sending acknowledgments.
    pub max_ack_delay: Duration,
    /// The ACK delay exponent is an integer value indicating an exponent used
    /// to decode the ACK Delay field in the ACK frame
    pub ack_delay_exponent: u8,

    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.2
    //# A receiver SHOULD send an ACK frame after receiving at least two
    //# ack-eliciting packets.
    /// The number of ack-eliciting packets received before an ACK is sent immediately
    pub ack_elicitation_threshold: u8,

    /// The number of packet number intervals an endpoint is willing to store
    pub ack_ranges_limit: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self::RECOMMENDED
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# ACK Delay:  A variable-length integer encoding the acknowledgment
//#    delay in microseconds; see Section 13.2.5.  It is decoded by
//#    multiplying the value in the field by 2 to the power of the
//#    ack_delay_exponent transport parameter sent by the sender of the
//#    ACK frame; see Section 18.2.

impl Settings {
    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.1
    //# An endpoint MUST acknowledge all ack-eliciting Initial and Handshake
    //# packets immediately
    pub const EARLY: Self = Self {
        max_ack_delay: Duration::from_secs(0),
        ack_delay_exponent: 0,
        ..Self::RECOMMENDED
    };

    pub const RECOMMENDED: Self = Self {
        max_ack_delay: Duration::from_millis(25),
        ack_delay_exponent: 3,
        ack_elicitation_threshold: 2,
        ack_ranges_limit: 64,
    };

    /// Decodes the peer's `Ack Delay` field
    #[inline]
    pub fn decode_ack_delay(&self, delay: VarInt) -> Duration {
        let micros = delay.as_u64().saturating_mul(self.scale());
        Duration::from_micros(micros)
    }

    /// Encodes the local `Ack Delay` field
    #[inline]
    pub fn encode_ack_delay(&self, delay: Duration) -> VarInt {
        let micros = delay.as_micros();
        let scale = self.scale() as u128;
        (micros / scale)
            .try_into()
            .ok()
            .and_then(|value: u64| VarInt::new(value).ok())
            .unwrap_or(VarInt::MAX)
    }

    /// Computes the scale from the exponent
    #[inline]
    fn scale(&self) -> u64 {
        1u64 << self.ack_delay_exponent.min(20)
    }
}
