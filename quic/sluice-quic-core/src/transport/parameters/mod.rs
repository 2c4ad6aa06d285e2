// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUIC transport parameters, exchanged inside the handshake

use crate::{transport, varint::VarInt};
use core::time::Duration;
use sluice_codec::{decoder_invariant, DecoderBuffer, DecoderError, Encoder, EncoderValue};


//= https://www.rfc-editor.org/rfc/rfc9000#section-18
//# Transport Parameters {
//#   Transport Parameter (..) ...,
//# }
//#
//# Transport Parameter {
//#   Transport Parameter ID (i),
//#   Transport Parameter Length (i),
//#   Transport Parameter Value (..),
//# }

/// The smallest `max_udp_payload_size` a peer may advertise
pub const MIN_MAX_UDP_PAYLOAD_SIZE: u64 = 1200;

/// The largest `ack_delay_exponent` a peer may advertise
pub const MAX_ACK_DELAY_EXPONENT: u64 = 20;

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# Values of 2^14 or greater are invalid.
pub const MAX_MAX_ACK_DELAY_MS: u64 = (1 << 14) - 1;

//= https://www.rfc-editor.org/rfc/rfc9000#section-4.6
//# If a max_streams transport parameter or a MAX_STREAMS frame is
//# received with a value greater than 2^60, this would allow a maximum
//# stream ID that cannot be expressed as a variable-length integer; see
//# Section 16.
pub const MAX_STREAMS_LIMIT: u64 = 1 << 60;

/// Generates the parameter set, its defaults and its TLV codec
macro_rules! transport_parameters {
    ($(
        $(#[doc = $doc:expr])*
        $field:ident = $id:literal, default $default:expr, max $max:expr, min $min:expr;
    )*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct TransportParameters {
            $(
                $(#[doc = $doc])*
                pub $field: VarInt,
            )*
        }

        impl Default for TransportParameters {
            fn default() -> Self {
                Self {
                    $(
                        $field: VarInt::from_u32($default),
                    )*
                }
            }
        }

        impl EncoderValue for TransportParameters {
            fn encode<E: Encoder>(&self, encoder: &mut E) {
                let defaults = Self::default();
                $(
                    if self.$field != defaults.$field {
                        VarInt::from_u32($id).encode(encoder);
                        encoder.encode_with_len_prefix::<VarInt, _>(&self.$field);
                    }
                )*
            }
        }

        impl TransportParameters {
            fn decode_parameters(mut buffer: DecoderBuffer) -> Result<Self, DecoderError> {
                let mut parameters = Self::default();
                let mut seen = 0u32;

                while !buffer.is_empty() {
                    let (id, remaining) = buffer.decode::<VarInt>()?;
                    let (value, remaining) = remaining.decode_slice_with_len_prefix::<VarInt>()?;
                    buffer = remaining;

                    let mut bit = 0u32;
                    $(
                        bit += 1;
                        if id == $id {
                            //= https://www.rfc-editor.org/rfc/rfc9000#section-7.4
                            //# An endpoint MUST NOT send a parameter more than once in a
                            //# given transport parameters extension.
                            decoder_invariant!(seen & (1 << bit) == 0, "duplicate transport parameter");
                            seen |= 1 << bit;

                            let (field, remaining) = value.decode::<VarInt>()?;
                            remaining.ensure_empty()?;
                            decoder_invariant!(
                                ($min..=$max).contains(&field.as_u64()),
                                concat!("invalid ", stringify!($field))
                            );
                            parameters.$field = field;
                            continue;
                        }
                    )*
                    let _ = bit;

                    //= https://www.rfc-editor.org/rfc/rfc9000#section-7.4.2
                    //# An endpoint MUST ignore transport parameters that it does
                    //# not support.
                    let _ = value;
                }

                Ok(parameters)
            }
        }
    };
}

transport_parameters! {
    /// Idle timeout in milliseconds; zero disables it
    max_idle_timeout = 0x01, default 0, max MAX_VARINT, min 0;
    max_udp_payload_size = 0x03, default 65527, max MAX_VARINT, min MIN_MAX_UDP_PAYLOAD_SIZE;
    initial_max_data = 0x04, default 0, max MAX_VARINT, min 0;
    initial_max_stream_data_bidi_local = 0x05, default 0, max MAX_VARINT, min 0;
    initial_max_stream_data_bidi_remote = 0x06, default 0, max MAX_VARINT, min 0;
    initial_max_stream_data_uni = 0x07, default 0, max MAX_VARINT, min 0;
    initial_max_streams_bidi = 0x08, default 0, max MAX_STREAMS_LIMIT, min 0;
    initial_max_streams_uni = 0x09, default 0, max MAX_STREAMS_LIMIT, min 0;
    ack_delay_exponent = 0x0a, default 3, max MAX_ACK_DELAY_EXPONENT, min 0;
    /// Maximum ACK delay in milliseconds
    max_ack_delay = 0x0b, default 25, max MAX_MAX_ACK_DELAY_MS, min 0;
}

const MAX_VARINT: u64 = crate::varint::MAX_VARINT_VALUE;

impl TransportParameters {
    /// Decodes the parameter block carried by the handshake
    ///
    /// Any malformed or out-of-range value is a `TRANSPORT_PARAMETER_ERROR`.
    pub fn decode(bytes: &[u8]) -> Result<Self, transport::Error> {
        Self::decode_parameters(DecoderBuffer::new(bytes)).map_err(|error| {
            let reason = match error {
                DecoderError::InvariantViolation(reason) => reason,
                _ => "malformed transport parameters",
            };
            transport::Error::TRANSPORT_PARAMETER_ERROR.with_reason(reason)
        })
    }

    /// Returns the idle timeout, if enabled
    #[inline]
    pub fn max_idle_timeout(&self) -> Option<Duration> {
        let ms = self.max_idle_timeout.as_u64();
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    #[inline]
    pub fn max_ack_delay(&self) -> Duration {
        Duration::from_millis(self.max_ack_delay.as_u64())
    }
}
