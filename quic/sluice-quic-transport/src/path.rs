// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The network path shared by all packet number spaces

use crate::transmission;
use core::time::Duration;
use sluice_quic_core::{
    ack,
    packet::PacketNumberSpace,
    recovery::{self, CongestionController, RttEstimator},
};

/// The path owns the round trip estimate and congestion state between peers
#[derive(Clone, Debug)]
pub struct Path<CC: CongestionController> {
    pub rtt_estimator: RttEstimator,
    pub congestion_controller: CC,
    /// Number of consecutive probe timeouts without an acknowledgement
    pub pto_count: u32,
    pub settings: recovery::Settings,
    /// Used to decode the Ack Delay field of received ACK frames
    pub peer_ack_settings: ack::Settings,
    max_datagram_size: u16,
}

impl<CC: CongestionController> Path<CC> {
    pub fn new(
        settings: recovery::Settings,
        congestion_controller: CC,
        max_datagram_size: u16,
    ) -> Self {
        Self {
            //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.2
            //# Until a round trip time is sampled, the max_ack_delay of the
            //# peer is unknown, so it is taken to be 0.
            rtt_estimator: RttEstimator::new(settings.initial_rtt, Duration::ZERO),
            congestion_controller,
            pto_count: 0,
            settings,
            peer_ack_settings: ack::Settings::RECOMMENDED,
            max_datagram_size,
        }
    }

    #[inline]
    pub fn max_datagram_size(&self) -> u16 {
        self.max_datagram_size
    }

    /// Applies the peer's `max_ack_delay` and `ack_delay_exponent` transport parameters
    #[inline]
    pub fn on_peer_ack_settings(&mut self, peer_ack_settings: ack::Settings) {
        self.peer_ack_settings = peer_ack_settings;
        self.rtt_estimator
            .on_max_ack_delay(peer_ack_settings.max_ack_delay);
    }

    /// Returns the probe timeout period for `space`, including the backoff
    #[inline]
    pub fn pto_period(&self, space: PacketNumberSpace) -> Duration {
        self.rtt_estimator
            .pto_period(self.settings.granularity, space)
            * self.settings.pto_backoff(self.pto_count)
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2
    //# The closing and draining connection states exist to ensure that
    //# connections close cleanly and that delayed or reordered packets are
    //# properly discarded.  These states SHOULD persist for at least three
    //# times the current PTO interval as defined in [QUIC-RECOVERY].

    #[inline]
    pub fn close_timeout(&self) -> Duration {
        3 * self
            .rtt_estimator
            .pto_period(self.settings.granularity, PacketNumberSpace::ApplicationData)
    }

    #[inline]
    pub fn transmission_constraint(&self) -> transmission::Constraint {
        if self
            .congestion_controller
            .is_congestion_limited(self.max_datagram_size)
        {
            transmission::Constraint::CongestionLimited
        } else {
            transmission::Constraint::None
        }
    }
}
