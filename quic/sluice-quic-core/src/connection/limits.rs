// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    ack,
    transport::parameters::{self, TransportParameters},
    varint::VarInt,
};
use core::{fmt, time::Duration};

/// A configuration value was outside of the range the protocol allows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationError(&'static str);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ValidationError {}

/// Per-connection limits advertised to the peer and enforced locally
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub(crate) max_idle_timeout: Duration,
    pub(crate) data_window: VarInt,
    pub(crate) bidirectional_local_data_window: VarInt,
    pub(crate) bidirectional_remote_data_window: VarInt,
    pub(crate) unidirectional_data_window: VarInt,
    pub(crate) max_open_bidirectional_streams: VarInt,
    pub(crate) max_open_unidirectional_streams: VarInt,
    pub(crate) max_ack_delay: Duration,
    pub(crate) ack_delay_exponent: u8,
    pub(crate) ack_elicitation_threshold: u8,
    pub(crate) ack_ranges_limit: u8,
    pub(crate) max_send_buffer_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! setter {
    ($name:ident, $field:ident, $inner:ty, $validate:expr) => {
        pub fn $name(mut self, value: $inner) -> Result<Self, ValidationError> {
            self.$field = $validate(value)?;
            Ok(self)
        }
    };
}

fn window(value: u64) -> Result<VarInt, ValidationError> {
    VarInt::new(value).map_err(|_| ValidationError("window exceeds the varint range"))
}

fn stream_count(value: u64) -> Result<VarInt, ValidationError> {
    ensure!(
        value <= parameters::MAX_STREAMS_LIMIT,
        Err(ValidationError("stream count exceeds 2^60"))
    );
    window(value)
}

fn idle_timeout(value: Duration) -> Result<Duration, ValidationError> {
    ensure!(
        value.as_millis() <= crate::varint::MAX_VARINT_VALUE as u128,
        Err(ValidationError("idle timeout exceeds the varint range"))
    );
    Ok(value)
}

fn ack_delay(value: Duration) -> Result<Duration, ValidationError> {
    ensure!(
        value.as_millis() <= parameters::MAX_MAX_ACK_DELAY_MS as u128,
        Err(ValidationError("max_ack_delay must be less than 2^14 ms"))
    );
    Ok(value)
}

fn ack_exponent(value: u8) -> Result<u8, ValidationError> {
    ensure!(
        value as u64 <= parameters::MAX_ACK_DELAY_EXPONENT,
        Err(ValidationError("ack_delay_exponent must not exceed 20"))
    );
    Ok(value)
}

fn non_zero_u8(value: u8) -> Result<u8, ValidationError> {
    ensure!(value > 0, Err(ValidationError("value must be non-zero")));
    Ok(value)
}

fn non_zero_u32(value: u32) -> Result<u32, ValidationError> {
    ensure!(value > 0, Err(ValidationError("value must be non-zero")));
    Ok(value)
}

impl Limits {
    pub const fn new() -> Self {
        Self {
            max_idle_timeout: Duration::from_secs(30),
            data_window: VarInt::from_u32(16 * 1024 * 1024),
            bidirectional_local_data_window: VarInt::from_u32(1024 * 1024),
            bidirectional_remote_data_window: VarInt::from_u32(1024 * 1024),
            unidirectional_data_window: VarInt::from_u32(1024 * 1024),
            max_open_bidirectional_streams: VarInt::from_u8(100),
            max_open_unidirectional_streams: VarInt::from_u8(100),
            max_ack_delay: ack::Settings::RECOMMENDED.max_ack_delay,
            ack_delay_exponent: ack::Settings::RECOMMENDED.ack_delay_exponent,
            ack_elicitation_threshold: ack::Settings::RECOMMENDED.ack_elicitation_threshold,
            ack_ranges_limit: ack::Settings::RECOMMENDED.ack_ranges_limit,
            max_send_buffer_size: 4 * 1024 * 1024,
        }
    }

    setter!(with_max_idle_timeout, max_idle_timeout, Duration, idle_timeout);
    setter!(with_data_window, data_window, u64, window);
    setter!(
        with_bidirectional_local_data_window,
        bidirectional_local_data_window,
        u64,
        window
    );
    setter!(
        with_bidirectional_remote_data_window,
        bidirectional_remote_data_window,
        u64,
        window
    );
    setter!(
        with_unidirectional_data_window,
        unidirectional_data_window,
        u64,
        window
    );
    setter!(
        with_max_open_bidirectional_streams,
        max_open_bidirectional_streams,
        u64,
        stream_count
    );
    setter!(
        with_max_open_unidirectional_streams,
        max_open_unidirectional_streams,
        u64,
        stream_count
    );
    setter!(with_max_ack_delay, max_ack_delay, Duration, ack_delay);
    setter!(with_ack_delay_exponent, ack_delay_exponent, u8, ack_exponent);
    setter!(
        with_ack_elicitation_threshold,
        ack_elicitation_threshold,
        u8,
        non_zero_u8
    );
    setter!(with_max_ack_ranges, ack_ranges_limit, u8, non_zero_u8);
    setter!(
        with_max_send_buffer_size,
        max_send_buffer_size,
        u32,
        non_zero_u32
    );

    #[inline]
    pub const fn ack_settings(&self) -> ack::Settings {
        ack::Settings {
            max_ack_delay: self.max_ack_delay,
            ack_delay_exponent: self.ack_delay_exponent,
            ack_elicitation_threshold: self.ack_elicitation_threshold,
            ack_ranges_limit: self.ack_ranges_limit,
        }
    }

    #[inline]
    pub fn max_idle_timeout(&self) -> Option<Duration> {
        (!self.max_idle_timeout.is_zero()).then_some(self.max_idle_timeout)
    }

    #[inline]
    pub const fn data_window(&self) -> VarInt {
        self.data_window
    }

    #[inline]
    pub const fn bidirectional_local_data_window(&self) -> VarInt {
        self.bidirectional_local_data_window
    }

    #[inline]
    pub const fn bidirectional_remote_data_window(&self) -> VarInt {
        self.bidirectional_remote_data_window
    }

    #[inline]
    pub const fn unidirectional_data_window(&self) -> VarInt {
        self.unidirectional_data_window
    }

    #[inline]
    pub const fn max_open_bidirectional_streams(&self) -> VarInt {
        self.max_open_bidirectional_streams
    }

    #[inline]
    pub const fn max_open_unidirectional_streams(&self) -> VarInt {
        self.max_open_unidirectional_streams
    }

    #[inline]
    pub const fn max_send_buffer_size(&self) -> u32 {
        self.max_send_buffer_size
    }

    /// Returns the transport parameters the local endpoint advertises
    pub fn transport_parameters(&self, max_udp_payload_size: u16) -> TransportParameters {
        TransportParameters {
            max_idle_timeout: VarInt::new(self.max_idle_timeout.as_millis() as u64)
                .unwrap_or(VarInt::MAX),
            max_udp_payload_size: VarInt::from_u16(max_udp_payload_size),
            initial_max_data: self.data_window,
            initial_max_stream_data_bidi_local: self.bidirectional_local_data_window,
            initial_max_stream_data_bidi_remote: self.bidirectional_remote_data_window,
            initial_max_stream_data_uni: self.unidirectional_data_window,
            initial_max_streams_bidi: self.max_open_bidirectional_streams,
            initial_max_streams_uni: self.max_open_unidirectional_streams,
            ack_delay_exponent: VarInt::from_u8(self.ack_delay_exponent),
            max_ack_delay: VarInt::new(self.max_ack_delay.as_millis() as u64)
                .unwrap_or(VarInt::MAX),
        }
    }
}
