// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{packet::PacketNumberSpace, time::Timestamp};
use core::{cmp::max, time::Duration};

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.2
//# When no previous RTT is available, the initial RTT
//# SHOULD be set to 333 milliseconds.
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(333);

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
//# The RECOMMENDED value of the
//# timer granularity (kGranularity) is 1 millisecond.
pub const K_GRANULARITY: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RttEstimator {
    /// Latest RTT sample
    latest_rtt: Duration,
    /// The minimum value observed over the lifetime of the connection
    min_rtt: Duration,
    /// An exponentially-weighted moving average
    smoothed_rtt: Duration,
    /// The variance in the observed RTT samples
    rttvar: Duration,
    /// The maximum amount of time by which the peer intends to delay acknowledgments for
    /// packets in the ApplicationData packet number space
    max_ack_delay: Duration,
    /// The time that the first RTT sample was obtained
    first_rtt_sample: Option<Timestamp>,
}

impl RttEstimator {
    /// Creates a new estimator seeded with `initial_rtt`
    pub fn new(initial_rtt: Duration, max_ack_delay: Duration) -> Self {
        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# Before any RTT samples are available for a new path or when the
        //# estimator is reset, the estimator is initialized using the initial RTT;
        //# see Section 6.2.2.
        //#
        //# smoothed_rtt and rttvar are initialized as follows, where kInitialRtt
        //# contains the initial RTT value:
        //#
        //# smoothed_rtt = kInitialRtt
        //# rttvar = kInitialRtt / 2
        Self {
            latest_rtt: Duration::ZERO,
            min_rtt: Duration::ZERO,
            smoothed_rtt: initial_rtt,
            rttvar: initial_rtt / 2,
            max_ack_delay,
            first_rtt_sample: None,
        }
    }

    #[inline]
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    #[inline]
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    #[inline]
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    #[inline]
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    #[inline]
    pub fn max_ack_delay(&self) -> Duration {
        self.max_ack_delay
    }

    #[inline]
    pub fn first_rtt_sample(&self) -> Option<Timestamp> {
        self.first_rtt_sample
    }

    /// Applies the peer's `max_ack_delay` transport parameter
    #[inline]
    pub fn on_max_ack_delay(&mut self, max_ack_delay: Duration) {
        self.max_ack_delay = max_ack_delay;
    }

    /// Returns the base probe timeout period for packets sent in `space`
    ///
    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
    //# PTO = smoothed_rtt + max(4*rttvar, kGranularity) + max_ack_delay
    //#
    //# When the PTO is armed for Initial or Handshake packet number spaces,
    //# the max_ack_delay in the PTO period computation is set to 0
    #[inline]
    pub fn pto_period(&self, granularity: Duration, space: PacketNumberSpace) -> Duration {
        let mut period = self.smoothed_rtt + max(4 * self.rttvar, granularity);

        if space.is_application_data() {
            period += self.max_ack_delay;
        }

        period
    }

    pub fn update_rtt(
        &mut self,
        mut ack_delay: Duration,
        rtt_sample: Duration,
        timestamp: Timestamp,
        is_handshake_confirmed: bool,
        space: PacketNumberSpace,
    ) {
        self.latest_rtt = rtt_sample.max(K_GRANULARITY);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# On the first RTT sample after initialization, smoothed_rtt and rttvar
        //# are set as follows:
        //#
        //# smoothed_rtt = latest_rtt
        //# rttvar = latest_rtt / 2
        if self.first_rtt_sample.is_none() {
            self.first_rtt_sample = Some(timestamp);
            self.min_rtt = self.latest_rtt;
            self.smoothed_rtt = self.latest_rtt;
            self.rttvar = self.latest_rtt / 2;
            return;
        }

        self.min_rtt = self.min_rtt.min(self.latest_rtt);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# *  MAY ignore the acknowledgment delay for Initial packets, since
        //#    these acknowledgments are not delayed by the peer (Section 13.2.1
        //#    of [QUIC-TRANSPORT]);
        if space.is_initial() {
            ack_delay = Duration::ZERO;
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# *  MUST use the lesser of the acknowledgment delay and the peer's
        //#    max_ack_delay after the handshake is confirmed;
        if is_handshake_confirmed {
            ack_delay = ack_delay.min(self.max_ack_delay);
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# *  MUST NOT subtract the acknowledgment delay from the RTT sample if
        //#    the resulting value is smaller than the min_rtt.
        let mut adjusted_rtt = self.latest_rtt;
        if self.min_rtt + ack_delay <= self.latest_rtt {
            adjusted_rtt -= ack_delay;
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# smoothed_rtt = 7/8 * smoothed_rtt + 1/8 * adjusted_rtt
        //# rttvar_sample = abs(smoothed_rtt - adjusted_rtt)
        //# rttvar = 3/4 * rttvar + 1/4 * rttvar_sample
        let rttvar_sample = abs_difference(self.smoothed_rtt, adjusted_rtt);
        self.smoothed_rtt = 7 * self.smoothed_rtt / 8 + adjusted_rtt / 8;
        self.rttvar = 3 * self.rttvar / 4 + rttvar_sample / 4;
    }
}

fn abs_difference(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn estimator() -> RttEstimator {
        RttEstimator::new(DEFAULT_INITIAL_RTT, Duration::from_millis(10))
    }

    #[test]
    fn initial_rtt() {
        let rtt_estimator = estimator();
        assert_eq!(rtt_estimator.min_rtt(), Duration::ZERO);
        assert_eq!(rtt_estimator.latest_rtt(), Duration::ZERO);
        assert_eq!(rtt_estimator.smoothed_rtt(), DEFAULT_INITIAL_RTT);
        assert_eq!(rtt_estimator.rttvar(), DEFAULT_INITIAL_RTT / 2);
    }

    #[test]
    fn zero_rtt_sample() {
        let mut rtt_estimator = estimator();
        let now = Timestamp::from_millis(1);
        rtt_estimator.update_rtt(
            Duration::from_millis(10),
            Duration::ZERO,
            now,
            false,
            PacketNumberSpace::ApplicationData,
        );
        assert_eq!(rtt_estimator.min_rtt(), K_GRANULARITY);
        assert_eq!(rtt_estimator.latest_rtt(), K_GRANULARITY);
        assert_eq!(rtt_estimator.first_rtt_sample(), Some(now));
    }

    #[test]
    fn max_ack_delay() {
        let mut rtt_estimator = estimator();
        let now = Timestamp::from_millis(1);
        rtt_estimator.update_rtt(
            Duration::ZERO,
            Duration::from_millis(100),
            now,
            true,
            PacketNumberSpace::ApplicationData,
        );

        rtt_estimator.update_rtt(
            Duration::from_millis(1000),
            Duration::from_millis(200),
            now,
            true,
            PacketNumberSpace::ApplicationData,
        );

        assert_eq!(
            rtt_estimator.smoothed_rtt(),
            7 * Duration::from_millis(100) / 8 + Duration::from_millis(200 - 10) / 8
        );

        let prev_smoothed_rtt = rtt_estimator.smoothed_rtt();

        // the delay isn't capped before the handshake is confirmed
        rtt_estimator.update_rtt(
            Duration::from_millis(50),
            Duration::from_millis(200),
            now,
            false,
            PacketNumberSpace::ApplicationData,
        );

        assert_eq!(
            rtt_estimator.smoothed_rtt(),
            7 * prev_smoothed_rtt / 8 + Duration::from_millis(200 - 50) / 8
        );
    }

    #[test]
    fn initial_space_ignores_ack_delay() {
        let mut rtt_estimator = estimator();
        let now = Timestamp::from_millis(1);
        rtt_estimator.update_rtt(
            Duration::ZERO,
            Duration::from_millis(100),
            now,
            false,
            PacketNumberSpace::Initial,
        );
        rtt_estimator.update_rtt(
            Duration::from_millis(50),
            Duration::from_millis(200),
            now,
            false,
            PacketNumberSpace::Initial,
        );
        assert_eq!(
            rtt_estimator.smoothed_rtt(),
            7 * Duration::from_millis(100) / 8 + Duration::from_millis(200) / 8
        );
    }

    #[test]
    fn update_rtt() {
        let mut rtt_estimator = estimator();
        let now = Timestamp::from_millis(1);
        let rtt_sample = Duration::from_millis(500);
        assert!(rtt_estimator.first_rtt_sample().is_none());
        rtt_estimator.update_rtt(
            Duration::from_millis(10),
            rtt_sample,
            now,
            true,
            PacketNumberSpace::ApplicationData,
        );

        assert_eq!(rtt_estimator.min_rtt(), rtt_sample);
        assert_eq!(rtt_estimator.latest_rtt(), rtt_sample);
        assert_eq!(rtt_estimator.smoothed_rtt(), rtt_sample);
        assert_eq!(rtt_estimator.rttvar(), rtt_sample / 2);
        assert_eq!(rtt_estimator.first_rtt_sample(), Some(now));

        let prev_smoothed_rtt = rtt_estimator.smoothed_rtt();
        let rtt_sample = Duration::from_millis(800);
        let ack_delay = Duration::from_millis(10);

        rtt_estimator.update_rtt(
            ack_delay,
            rtt_sample,
            now + Duration::from_secs(1),
            true,
            PacketNumberSpace::ApplicationData,
        );

        let adjusted_rtt = rtt_sample - ack_delay;

        assert_eq!(rtt_estimator.min_rtt(), prev_smoothed_rtt);
        assert_eq!(rtt_estimator.latest_rtt(), rtt_sample);
        assert_eq!(
            rtt_estimator.smoothed_rtt(),
            7 * prev_smoothed_rtt / 8 + adjusted_rtt / 8
        );
        assert_eq!(rtt_estimator.first_rtt_sample(), Some(now));

        // a new minimum is not adjusted by the ack delay
        let prev_smoothed_rtt = rtt_estimator.smoothed_rtt();
        let rtt_sample = Duration::from_millis(200);

        rtt_estimator.update_rtt(
            ack_delay,
            rtt_sample,
            now + Duration::from_secs(2),
            true,
            PacketNumberSpace::ApplicationData,
        );

        assert_eq!(rtt_estimator.min_rtt(), rtt_sample);
        assert_eq!(
            rtt_estimator.smoothed_rtt(),
            7 * prev_smoothed_rtt / 8 + rtt_sample / 8
        );
    }

    #[test]
    fn pto_period() {
        let rtt_estimator = estimator();
        let granularity = K_GRANULARITY;
        let base = DEFAULT_INITIAL_RTT + 4 * (DEFAULT_INITIAL_RTT / 2);
        assert_eq!(
            rtt_estimator.pto_period(granularity, PacketNumberSpace::Initial),
            base
        );
        assert_eq!(
            rtt_estimator.pto_period(granularity, PacketNumberSpace::Handshake),
            base
        );
        assert_eq!(
            rtt_estimator.pto_period(granularity, PacketNumberSpace::ApplicationData),
            base + Duration::from_millis(10)
        );
    }
}
