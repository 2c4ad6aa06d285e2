// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tracks received packet numbers and decides when to acknowledge them

use crate::transmission::WriteContext;
use sluice_quic_core::{
    ack,
    frame::Ack,
    packet::PacketNumberSpace,
    range_set::RangeSet,
    time::{Timer, Timestamp},
};

#[derive(Debug)]
pub struct Manager {
    space: PacketNumberSpace,
    settings: ack::Settings,
    /// The packet numbers received since the space was created
    received: RangeSet,
    /// Packet numbers below this value were pruned from `received`
    ///
    /// Anything below it is treated as a duplicate.
    floor: u64,
    /// The largest packet number received and the time it arrived
    largest_received: Option<(u64, Timestamp)>,
    ack_eliciting_since_last_ack: u8,
    /// Set when received packets haven't been reported in an ACK yet
    has_new_ranges: bool,
    immediate: bool,
    ack_delay_timer: Timer,
}

impl Manager {
    pub fn new(space: PacketNumberSpace, settings: ack::Settings) -> Self {
        Self {
            space,
            settings,
            received: RangeSet::new(),
            floor: 0,
            largest_received: None,
            ack_eliciting_since_last_ack: 0,
            has_new_ranges: false,
            immediate: false,
            ack_delay_timer: Timer::default(),
        }
    }

    #[inline]
    pub fn largest_received(&self) -> Option<u64> {
        self.largest_received.map(|(packet_number, _)| packet_number)
    }

    /// Records a received packet
    ///
    /// Returns `false` if the packet was already received and must be ignored.
    pub fn on_packet_received(
        &mut self,
        packet_number: u64,
        is_ack_eliciting: bool,
        now: Timestamp,
    ) -> bool {
        if packet_number < self.floor || self.received.contains(packet_number) {
            tracing::trace!(space = ?self.space, packet_number, "duplicate packet");
            return false;
        }

        self.received.insert_value(packet_number);
        while self.received.interval_len() > self.settings.ack_ranges_limit.max(1) as usize {
            if let Some(pruned) = self.received.pop_min() {
                self.floor = pruned.end;
            }
        }

        let previous_largest = self.largest_received();
        let is_out_of_order = match previous_largest {
            Some(largest) => packet_number != largest + 1,
            None => false,
        };
        if previous_largest.map_or(true, |largest| packet_number > largest) {
            self.largest_received = Some((packet_number, now));
        }

        self.has_new_ranges = true;

        if !is_ack_eliciting {
            return true;
        }

        self.ack_eliciting_since_last_ack = self.ack_eliciting_since_last_ack.saturating_add(1);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.1
        //# An endpoint MUST acknowledge all ack-eliciting Initial and Handshake
        //# packets immediately and all ack-eliciting 0-RTT and 1-RTT packets
        //# within its advertised max_ack_delay

        //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.1
        //# In order to assist loss detection at the sender, an endpoint SHOULD
        //# generate and send an ACK frame without delay when it receives an ack-
        //# eliciting packet either:
        //#
        //# *  when the received packet has a packet number less than another
        //#    ack-eliciting packet that has been received, or
        //#
        //# *  when the packet has a packet number larger than the highest-
        //#    numbered ack-eliciting packet that has been received and there are
        //#    missing packets between that packet and this packet.
        if !self.space.is_application_data()
            || is_out_of_order
            || self.ack_eliciting_since_last_ack >= self.settings.ack_elicitation_threshold
        {
            self.immediate = true;
        } else {
            self.ack_delay_timer
                .set_if_unarmed(now + self.settings.max_ack_delay);
        }

        true
    }

    /// Returns `true` if an ACK frame is owed to the peer now
    #[inline]
    pub fn should_transmit(&self, now: Timestamp) -> bool {
        self.immediate || self.ack_delay_timer.is_expired(now)
    }

    /// Returns `true` if received packets haven't been acknowledged yet
    ///
    /// Such ranges ride along in packets that are sent for other reasons.
    #[inline]
    pub fn has_new_ranges(&self) -> bool {
        self.has_new_ranges
    }

    #[inline]
    pub fn next_expiration(&self) -> Option<Timestamp> {
        self.ack_delay_timer.expiration()
    }

    pub fn on_timeout(&mut self, now: Timestamp) {
        if self.ack_delay_timer.poll_expiration(now).is_ready() {
            self.immediate = true;
        }
    }

    /// Writes an ACK frame covering every received packet
    ///
    /// Returns `false` if nothing was written.
    pub fn on_transmit<W: WriteContext>(&mut self, context: &mut W) -> bool {
        let Some((_, largest_received_time)) = self.largest_received else {
            return false;
        };

        //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.5
        //# An endpoint measures the delays intentionally introduced between the
        //# time the packet with the largest packet number is received and the
        //# time an acknowledgment is sent.
        let delay = context
            .current_time()
            .saturating_duration_since(largest_received_time);

        let frame = Ack {
            ack_delay: self.settings.encode_ack_delay(delay),
            ack_ranges: &self.received,
            ecn_counts: None,
        };

        if !context.write_untracked_frame(&frame) {
            return false;
        }

        self.ack_eliciting_since_last_ack = 0;
        self.has_new_ranges = false;
        self.immediate = false;
        self.ack_delay_timer.cancel();
        true
    }
}
