// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{recovery::RttEstimator, time::Timestamp};

/// Limits the number of bytes a connection may have in flight
///
/// Bytes are only counted for packets that are ack-eliciting or carry padding;
/// callers pass `0` for packets that don't count.
pub trait CongestionController: 'static + Clone + Send + core::fmt::Debug {
    /// Returns the size of the current congestion window in bytes
    fn congestion_window(&self) -> u32;

    /// Returns the current bytes in flight
    fn bytes_in_flight(&self) -> u32;

    /// Returns the number of bytes that may be sent before the window is full
    #[inline]
    fn available(&self) -> u32 {
        self.congestion_window()
            .saturating_sub(self.bytes_in_flight())
    }

    /// Returns `true` if the congestion window does not have sufficient
    /// space for a packet of `max_datagram_size`
    #[inline]
    fn is_congestion_limited(&self, max_datagram_size: u16) -> bool {
        self.available() < max_datagram_size as u32
    }

    /// Invoked whenever a congestion controlled packet is sent
    fn on_packet_sent(&mut self, time_sent: Timestamp, bytes_sent: usize);

    /// Invoked for each newly acknowledged packet
    fn on_packet_ack(
        &mut self,
        time_sent: Timestamp,
        bytes_acked: usize,
        rtt_estimator: &RttEstimator,
        ack_receive_time: Timestamp,
    );

    /// Invoked once per batch of packets declared lost
    ///
    /// `largest_lost_time_sent` is the send time of the newest lost packet,
    /// which decides whether a new recovery period starts.
    fn on_packets_lost(
        &mut self,
        lost_bytes: u32,
        largest_lost_time_sent: Timestamp,
        persistent_congestion: bool,
        timestamp: Timestamp,
    );

    /// Invoked when packets are discarded along with their packet number space keys
    fn on_packet_discarded(&mut self, bytes_sent: usize);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A controller that never limits the sender
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Unlimited {
        bytes_in_flight: u32,
    }

    impl CongestionController for Unlimited {
        fn congestion_window(&self) -> u32 {
            u32::MAX
        }

        fn bytes_in_flight(&self) -> u32 {
            self.bytes_in_flight
        }

        fn on_packet_sent(&mut self, _time_sent: Timestamp, bytes_sent: usize) {
            self.bytes_in_flight = self.bytes_in_flight.saturating_add(bytes_sent as u32);
        }

        fn on_packet_ack(
            &mut self,
            _time_sent: Timestamp,
            bytes_acked: usize,
            _rtt_estimator: &RttEstimator,
            _ack_receive_time: Timestamp,
        ) {
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes_acked as u32);
        }

        fn on_packets_lost(
            &mut self,
            lost_bytes: u32,
            _largest_lost_time_sent: Timestamp,
            _persistent_congestion: bool,
            _timestamp: Timestamp,
        ) {
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(lost_bytes);
        }

        fn on_packet_discarded(&mut self, bytes_sent: usize) {
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes_sent as u32);
        }
    }
}
