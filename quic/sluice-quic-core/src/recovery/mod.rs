// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use num_rational::Ratio;

pub use congestion_controller::CongestionController;
pub use new_reno::NewReno;
pub use rtt_estimator::*;

pub mod congestion_controller;
pub mod new_reno;
mod rtt_estimator;

/// Loss detection and probe timeout settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.1
    //# The RECOMMENDED initial value for the packet reordering threshold
    //# (kPacketThreshold) is 3, based on best practices for TCP loss
    //# detection [RFC5681] [RFC6675].
    pub packet_threshold: u64,

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
    //# The RECOMMENDED time threshold (kTimeThreshold), expressed as an
    //# RTT multiplier, is 9/8.
    pub time_threshold: Ratio<u32>,

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
    //# The RECOMMENDED value of the
    //# timer granularity (kGranularity) is 1 millisecond.
    pub granularity: Duration,

    pub initial_rtt: Duration,

    /// The largest exponent applied to the PTO period on consecutive timeouts
    pub max_pto_backoff: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self::RECOMMENDED
    }
}

impl Settings {
    pub const RECOMMENDED: Self = Self {
        packet_threshold: 3,
        time_threshold: Ratio::new_raw(9, 8),
        granularity: K_GRANULARITY,
        initial_rtt: DEFAULT_INITIAL_RTT,
        max_pto_backoff: 6,
    };

    /// Returns the time after which a packet sent before a newer acknowledged packet is lost
    ///
    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
    //# The time threshold is:
    //#
    //# max(kTimeThreshold * max(smoothed_rtt, latest_rtt), kGranularity)
    #[inline]
    pub fn loss_delay(&self, rtt_estimator: &RttEstimator) -> Duration {
        let rtt = rtt_estimator
            .smoothed_rtt()
            .max(rtt_estimator.latest_rtt());
        let delay = rtt * *self.time_threshold.numer() / *self.time_threshold.denom();
        delay.max(self.granularity)
    }

    /// Returns the multiplier for the PTO period after `pto_count` consecutive timeouts
    #[inline]
    pub fn pto_backoff(&self, pto_count: u32) -> u32 {
        1 << pto_count.min(self.max_pto_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_delay_test() {
        let settings = Settings::default();
        let mut rtt_estimator = RttEstimator::new(settings.initial_rtt, Duration::ZERO);
        assert_eq!(
            settings.loss_delay(&rtt_estimator),
            Duration::from_millis(333) * 9 / 8
        );

        rtt_estimator.update_rtt(
            Duration::ZERO,
            Duration::from_micros(100),
            crate::time::Timestamp::from_millis(1),
            true,
            crate::packet::PacketNumberSpace::ApplicationData,
        );
        // samples are clamped to the granularity
        assert_eq!(
            settings.loss_delay(&rtt_estimator),
            Duration::from_millis(1) * 9 / 8
        );

        let settings = Settings {
            granularity: Duration::from_millis(5),
            ..settings
        };
        assert_eq!(settings.loss_delay(&rtt_estimator), settings.granularity);
    }

    #[test]
    fn pto_backoff_test() {
        let settings = Settings::default();
        assert_eq!(settings.pto_backoff(0), 1);
        assert_eq!(settings.pto_backoff(3), 8);
        assert_eq!(settings.pto_backoff(6), 64);
        assert_eq!(settings.pto_backoff(40), 64);
    }
}
