// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    recovery::{CongestionController, RttEstimator},
    time::Timestamp,
};
use core::cmp::{max, min};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    SlowStart,
    /// Entered at the given time; packets sent before it don't reduce the window again
    Recovery(Timestamp),
    CongestionAvoidance,
}

/// The congestion controller described in RFC 9002 Section 7
#[derive(Clone, Debug)]
pub struct NewReno {
    max_datagram_size: u16,
    congestion_window: u32,
    slow_start_threshold: u32,
    //= https://www.rfc-editor.org/rfc/rfc9002#section-B.2
    //# The sum of the size in bytes of all sent packets
    //# that contain at least one ack-eliciting or PADDING frame and have
    //# not been acknowledged or declared lost.
    bytes_in_flight: u32,
    /// Bytes acknowledged since the window last grew in congestion avoidance
    bytes_acked: u32,
    state: State,
}

impl NewReno {
    pub fn new(max_datagram_size: u16) -> Self {
        Self {
            max_datagram_size,
            congestion_window: Self::initial_window(max_datagram_size),
            slow_start_threshold: u32::MAX,
            bytes_in_flight: 0,
            bytes_acked: 0,
            state: State::SlowStart,
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.2
    //# Endpoints SHOULD use an initial congestion
    //# window of ten times the maximum datagram size (max_datagram_size),
    //# while limiting the window to the larger of 14,720 bytes or twice the
    //# maximum datagram size.
    #[inline]
    fn initial_window(max_datagram_size: u16) -> u32 {
        const INITIAL_WINDOW_LIMIT: u32 = 14720;
        let max_datagram_size = max_datagram_size as u32;
        min(
            10 * max_datagram_size,
            max(INITIAL_WINDOW_LIMIT, 2 * max_datagram_size),
        )
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.2
    //# The RECOMMENDED value is 2 * max_datagram_size.
    #[inline]
    fn minimum_window(&self) -> u32 {
        2 * self.max_datagram_size as u32
    }

    #[inline]
    fn in_recovery(&self, time_sent: Timestamp) -> bool {
        matches!(self.state, State::Recovery(start) if time_sent <= start)
    }
}

impl CongestionController for NewReno {
    #[inline]
    fn congestion_window(&self) -> u32 {
        self.congestion_window
    }

    #[inline]
    fn bytes_in_flight(&self) -> u32 {
        self.bytes_in_flight
    }

    #[inline]
    fn on_packet_sent(&mut self, _time_sent: Timestamp, bytes_sent: usize) {
        if bytes_sent == 0 {
            return;
        }

        self.bytes_in_flight = self.bytes_in_flight.saturating_add(bytes_sent as u32);
    }

    fn on_packet_ack(
        &mut self,
        time_sent: Timestamp,
        bytes_acked: usize,
        _rtt_estimator: &RttEstimator,
        _ack_receive_time: Timestamp,
    ) {
        let bytes_acked = bytes_acked as u32;
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes_acked);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.2
        //# A recovery period ends and the sender enters congestion avoidance
        //# when a packet sent during the recovery period is acknowledged.
        if self.in_recovery(time_sent) {
            return;
        }

        if let State::Recovery(_) = self.state {
            self.state = State::CongestionAvoidance;
        }

        if self.congestion_window < self.slow_start_threshold {
            //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.1
            //# While a sender is in slow start, the congestion window
            //# increases by the number of bytes acknowledged when each
            //# acknowledgment is processed.
            self.congestion_window = self.congestion_window.saturating_add(bytes_acked);
            return;
        }

        self.state = State::CongestionAvoidance;

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.3
        //# Implementations SHOULD use an additive increase
        //# mechanism that limits the increase of the congestion window to at
        //# most one maximum datagram size for each congestion window that is
        //# acknowledged.
        self.bytes_acked = self.bytes_acked.saturating_add(bytes_acked);
        if self.bytes_acked >= self.congestion_window {
            self.bytes_acked -= self.congestion_window;
            self.congestion_window = self
                .congestion_window
                .saturating_add(self.max_datagram_size as u32);
        }
    }

    fn on_packets_lost(
        &mut self,
        lost_bytes: u32,
        largest_lost_time_sent: Timestamp,
        persistent_congestion: bool,
        timestamp: Timestamp,
    ) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(lost_bytes);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.2
        //# On entering a recovery period, a sender MUST set the slow start
        //# threshold to half the value of the congestion window when loss is
        //# detected.  The congestion window MUST be set to the reduced value of
        //# the slow start threshold before exiting the function.
        if !self.in_recovery(largest_lost_time_sent) {
            self.state = State::Recovery(timestamp);
            self.congestion_window = max(self.congestion_window / 2, self.minimum_window());
            self.slow_start_threshold = self.congestion_window;
            self.bytes_acked = 0;
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
        //# When persistent congestion is declared, the sender's congestion
        //# window MUST be reduced to the minimum congestion window
        //# (kMinimumWindow), similar to a TCP sender's response on an RTO
        //# [RFC5681].
        if persistent_congestion {
            self.congestion_window = self.minimum_window();
            self.state = State::SlowStart;
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.4
    //# The sender MUST discard all recovery state
    //# associated with those packets and MUST remove them from the count of
    //# bytes in flight.
    #[inline]
    fn on_packet_discarded(&mut self, bytes_sent: usize) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes_sent as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{recovery::DEFAULT_INITIAL_RTT, time::Duration};

    const MTU: u16 = 1200;

    fn rtt() -> RttEstimator {
        RttEstimator::new(DEFAULT_INITIAL_RTT, Duration::ZERO)
    }

    #[test]
    fn initial_window_test() {
        assert_eq!(NewReno::initial_window(1200), 12000);
        assert_eq!(NewReno::initial_window(1500), 14720);
        assert_eq!(NewReno::initial_window(9000), 18000);
    }

    #[test]
    fn slow_start_test() {
        let now = Timestamp::from_millis(1);
        let mut cc = NewReno::new(MTU);
        let initial = cc.congestion_window();

        cc.on_packet_sent(now, 1000);
        assert_eq!(cc.bytes_in_flight(), 1000);
        assert_eq!(cc.available(), initial - 1000);

        cc.on_packet_ack(now, 1000, &rtt(), now + Duration::from_millis(10));
        assert_eq!(cc.bytes_in_flight(), 0);
        assert_eq!(cc.congestion_window(), initial + 1000);
    }

    #[test]
    fn loss_halves_once_per_recovery_test() {
        let sent = Timestamp::from_millis(1);
        let detected = Timestamp::from_millis(100);
        let mut cc = NewReno::new(MTU);
        let initial = cc.congestion_window();

        cc.on_packet_sent(sent, 1200);
        cc.on_packet_sent(sent, 1200);
        cc.on_packets_lost(1200, sent, false, detected);
        assert_eq!(cc.congestion_window(), initial / 2);
        assert_eq!(cc.bytes_in_flight(), 1200);

        // a packet sent before the recovery period started doesn't reduce the window again
        cc.on_packets_lost(1200, sent, false, detected + Duration::from_millis(1));
        assert_eq!(cc.congestion_window(), initial / 2);
        assert_eq!(cc.bytes_in_flight(), 0);

        // acks for packets sent before recovery don't grow the window
        let later = detected + Duration::from_millis(5);
        cc.on_packet_sent(sent, 1200);
        cc.on_packet_ack(sent, 1200, &rtt(), later);
        assert_eq!(cc.congestion_window(), initial / 2);

        // losing a packet sent after recovery started reduces again
        cc.on_packet_sent(later, 1200);
        cc.on_packets_lost(1200, later, false, later + Duration::from_millis(1));
        assert_eq!(cc.congestion_window(), initial / 4);
    }

    #[test]
    fn congestion_avoidance_test() {
        let sent = Timestamp::from_millis(1);
        let detected = Timestamp::from_millis(100);
        let mut cc = NewReno::new(MTU);

        cc.on_packet_sent(sent, 1200);
        cc.on_packets_lost(1200, sent, false, detected);
        let window = cc.congestion_window();

        // acknowledging a full window grows it by one datagram
        let after = detected + Duration::from_millis(1);
        let mut acked = 0;
        while acked < window {
            cc.on_packet_sent(after, 1200);
            cc.on_packet_ack(after, 1200, &rtt(), after);
            acked += 1200;
        }
        assert_eq!(cc.congestion_window(), window + MTU as u32);
    }

    #[test]
    fn minimum_window_test() {
        let mut cc = NewReno::new(MTU);
        let mut now = Timestamp::from_millis(1);
        for _ in 0..10 {
            cc.on_packet_sent(now, 1200);
            now += Duration::from_millis(1);
            cc.on_packets_lost(1200, now, false, now);
            now += Duration::from_millis(1);
        }
        assert_eq!(cc.congestion_window(), 2 * MTU as u32);

        let mut cc = NewReno::new(MTU);
        cc.on_packet_sent(now, 1200);
        cc.on_packets_lost(1200, now, true, now);
        assert_eq!(cc.congestion_window(), 2 * MTU as u32);
    }

    #[test]
    fn discard_test() {
        let mut cc = NewReno::new(MTU);
        cc.on_packet_sent(Timestamp::from_millis(1), 500);
        cc.on_packet_discarded(500);
        assert_eq!(cc.bytes_in_flight(), 0);
    }
}
