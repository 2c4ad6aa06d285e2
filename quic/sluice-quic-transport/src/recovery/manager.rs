// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    path::Path,
    recovery::{pto::Pto, SentFrame, SentPacket, SentPackets},
    transmission::WriteContext,
};
use alloc::vec::Vec;
use sluice_quic_core::{
    frame::{ack::AckRanges, Ack},
    packet::PacketNumberSpace,
    recovery::CongestionController,
    time::{Timer, Timestamp},
    transport,
};

/// Loss detection for a single packet number space
#[derive(Debug)]
pub struct Manager {
    // The packet space for this recovery manager
    space: PacketNumberSpace,

    //= https://www.rfc-editor.org/rfc/rfc9002#section-A.3
    //# The largest packet number acknowledged in the packet number space so far.
    largest_acked_packet: Option<u64>,

    largest_sent_packet: Option<u64>,

    //= https://www.rfc-editor.org/rfc/rfc9002#section-A.3
    //# An association of packet numbers in a packet number space to information about them.
    sent_packets: SentPackets,

    // Set when packets may be declared lost at a time in the future
    loss_timer: Timer,

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2
    //# A Probe Timeout (PTO) triggers the sending of one or two probe
    //# datagrams when ack-eliciting packets are not acknowledged within the
    //# expected period of time or the server may not have validated the
    //# client's address.
    pto: Pto,

    //= https://www.rfc-editor.org/rfc/rfc9002#section-A.3
    //# The time the most recent ack-eliciting packet was sent.
    time_of_last_ack_eliciting_packet: Option<Timestamp>,
}

/// The packets resolved by an ACK frame or a timeout
#[derive(Debug, Default)]
pub struct Outcome {
    pub acked: Vec<SentPacket>,
    pub lost: Vec<SentPacket>,
    /// Frames of outstanding packets to send again in probes
    ///
    /// The packets stay outstanding; a later acknowledgement still resolves them.
    pub probes: Vec<SentFrame>,
}

impl Outcome {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.acked.is_empty() && self.lost.is_empty() && self.probes.is_empty()
    }
}

impl Manager {
    pub fn new(space: PacketNumberSpace) -> Self {
        Self {
            space,
            largest_acked_packet: None,
            largest_sent_packet: None,
            sent_packets: SentPackets::default(),
            loss_timer: Timer::default(),
            pto: Pto::default(),
            time_of_last_ack_eliciting_packet: None,
        }
    }

    #[inline]
    pub fn space(&self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub fn largest_acked_packet(&self) -> Option<u64> {
        self.largest_acked_packet
    }

    #[inline]
    pub fn sent_packets(&self) -> &SentPackets {
        &self.sent_packets
    }

    /// Returns the earliest loss detection or probe deadline
    #[inline]
    pub fn next_expiration(&self) -> Option<Timestamp> {
        self.loss_timer.expiration().or_else(|| self.pto.expiration())
    }

    /// Returns `true` if a probe packet is owed to the peer
    ///
    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.5
    //# Probe packets MUST NOT be blocked by the congestion controller.
    #[inline]
    pub fn requires_probe(&self) -> bool {
        self.pto.requires_transmission()
    }

    /// Queries the component for any outgoing frames that need to get sent
    #[inline]
    pub fn on_transmit<W: WriteContext>(&mut self, context: &mut W) {
        self.pto.on_transmit(context)
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-A.5
    //# After a packet is sent, information about the packet is stored.
    pub fn on_packet_sent<CC: CongestionController>(
        &mut self,
        packet: SentPacket,
        path: &mut Path<CC>,
        is_handshake_confirmed: bool,
    ) {
        debug_assert!(
            self.largest_sent_packet
                .map_or(true, |largest| packet.packet_number > largest),
            "packet numbers must strictly increase"
        );

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7
        //# Similar to TCP, packets containing only ACK frames do not count
        //# toward bytes in flight and are not congestion controlled.
        path.congestion_controller
            .on_packet_sent(packet.time_sent, packet.sent_bytes as usize);

        let time_sent = packet.time_sent;
        let is_ack_eliciting = packet.ack_eliciting && packet.is_in_flight();
        self.largest_sent_packet = Some(packet.packet_number);
        self.sent_packets.insert(packet);

        if is_ack_eliciting {
            self.time_of_last_ack_eliciting_packet = Some(time_sent);
            self.update_pto_timer(path, is_handshake_confirmed);
        }
    }

    /// Processes an ACK frame received in this space
    ///
    /// Returns the newly acknowledged packets along with any packets the
    /// acknowledgement proved lost.
    pub fn on_ack_frame<A: AckRanges, CC: CongestionController>(
        &mut self,
        frame: &Ack<A>,
        now: Timestamp,
        path: &mut Path<CC>,
        is_handshake_confirmed: bool,
    ) -> Result<Outcome, transport::Error> {
        let largest_acknowledged = frame.largest_acknowledged().as_u64();

        //= https://www.rfc-editor.org/rfc/rfc9000#section-13.1
        //# An endpoint SHOULD treat receipt of an acknowledgment for a packet it
        //# did not send as a connection error of type PROTOCOL_VIOLATION, if it
        //# is able to detect the condition.
        ensure!(
            self.largest_sent_packet
                .map_or(false, |largest| largest_acknowledged <= largest),
            Err(transport::Error::PROTOCOL_VIOLATION
                .with_reason("acknowledged a packet that was never sent"))
        );

        let mut outcome = Outcome::default();
        for range in frame.ack_ranges() {
            let range = range.start().as_u64()..=range.end().as_u64();
            let newly_acked: Vec<u64> = self.sent_packets.packet_numbers_in(range).collect();
            for packet_number in newly_acked {
                if let Some(packet) = self.sent_packets.remove(packet_number) {
                    outcome.acked.push(packet);
                }
            }
        }

        if outcome.acked.is_empty() {
            return Ok(outcome);
        }

        self.largest_acked_packet = Some(
            self.largest_acked_packet
                .map_or(largest_acknowledged, |prev| prev.max(largest_acknowledged)),
        );

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.1
        //# An endpoint generates an RTT sample on receiving an ACK frame that
        //# meets the following two conditions:
        //#
        //# *  the largest acknowledged packet number is newly acknowledged, and
        //#
        //# *  at least one of the newly acknowledged packets was ack-eliciting.
        let largest_newly_acked = outcome
            .acked
            .iter()
            .find(|packet| packet.packet_number == largest_acknowledged);
        let includes_ack_eliciting = outcome.acked.iter().any(|packet| packet.ack_eliciting);
        if let (Some(largest), true) = (largest_newly_acked, includes_ack_eliciting) {
            let rtt_sample = now.saturating_duration_since(largest.time_sent);
            let ack_delay = path.peer_ack_settings.decode_ack_delay(frame.ack_delay);
            path.rtt_estimator.update_rtt(
                ack_delay,
                rtt_sample,
                now,
                is_handshake_confirmed,
                self.space,
            );
            tracing::trace!(
                space = ?self.space,
                latest_rtt = ?path.rtt_estimator.latest_rtt(),
                smoothed_rtt = ?path.rtt_estimator.smoothed_rtt(),
                "rtt sample"
            );
        }

        for packet in &outcome.acked {
            if packet.is_in_flight() {
                path.congestion_controller.on_packet_ack(
                    packet.time_sent,
                    packet.sent_bytes as usize,
                    &path.rtt_estimator,
                    now,
                );
            }
        }

        outcome.lost = self.detect_and_remove_lost_packets(now, path);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
        //# The PTO backoff factor is reset when an acknowledgment is received
        path.pto_count = 0;

        if !self.loss_timer.is_armed() {
            self.update_pto_timer(path, is_handshake_confirmed);
        }

        Ok(outcome)
    }

    /// Handles the expiration of the loss or probe timer
    pub fn on_timeout<CC: CongestionController>(
        &mut self,
        now: Timestamp,
        path: &mut Path<CC>,
        is_handshake_confirmed: bool,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        if self.loss_timer.is_armed() {
            if self.loss_timer.poll_expiration(now).is_ready() {
                outcome.lost = self.detect_and_remove_lost_packets(now, path);
                if !self.loss_timer.is_armed() {
                    self.update_pto_timer(path, is_handshake_confirmed);
                }
            }
            return outcome;
        }

        let packets_in_flight = self.sent_packets.iter().any(SentPacket::is_in_flight);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2
        //# A PTO timer expiration event does not indicate packet loss and MUST
        //# NOT cause prior unacknowledged packets to be marked as lost.
        if self.pto.on_timeout(packets_in_flight, now) {
            //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
            //# When a PTO timer expires, the PTO backoff MUST be increased,
            //# resulting in the PTO period being set to twice its current value.
            path.pto_count = path.pto_count.saturating_add(1);

            //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
            //# When there is no data to send, the sender SHOULD send
            //# a PING or other ack-eliciting frame in a single packet, re-arming the
            //# PTO timer.
            outcome.probes = self
                .sent_packets
                .iter()
                .filter(|packet| packet.ack_eliciting)
                .flat_map(|packet| packet.frames.iter().copied())
                .collect();

            tracing::debug!(
                space = ?self.space,
                pto_count = path.pto_count,
                probes = outcome.probes.len(),
                "probe timeout"
            );

            self.update_pto_timer(path, is_handshake_confirmed);
        }

        outcome
    }

    /// Re-arms the probe timer after the handshake was confirmed or keys were discarded
    pub fn update_pto_timer<CC: CongestionController>(
        &mut self,
        path: &Path<CC>,
        is_handshake_confirmed: bool,
    ) {
        let ack_eliciting_in_flight = self
            .sent_packets
            .iter()
            .any(|packet| packet.ack_eliciting && packet.is_in_flight());

        // There is nothing to detect lost, so no timer is set.
        let Some(base) = self
            .time_of_last_ack_eliciting_packet
            .filter(|_| ack_eliciting_in_flight)
        else {
            self.pto.cancel();
            return;
        };

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
        //# An endpoint MUST NOT set its PTO timer for the Application Data
        //# packet number space until the handshake is confirmed.
        if self.space.is_application_data() && !is_handshake_confirmed {
            self.pto.cancel();
        } else {
            self.pto.update(base, path.pto_period(self.space));
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.4
    //# When Initial or Handshake keys are discarded, packets sent in that
    //# space no longer count toward bytes in flight.
    pub fn discard<CC: CongestionController>(&mut self, path: &mut Path<CC>) {
        let bytes = self.sent_packets.clear();
        path.congestion_controller.on_packet_discarded(bytes);
        self.loss_timer.cancel();
        self.pto.cancel();
        self.time_of_last_ack_eliciting_packet = None;
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-A.10
    //# DetectAndRemoveLostPackets is called every time an ACK is received or the time threshold
    //# loss detection timer expires. This function operates on the sent_packets for that packet
    //# number space and returns a list of packets newly detected as lost.
    fn detect_and_remove_lost_packets<CC: CongestionController>(
        &mut self,
        now: Timestamp,
        path: &mut Path<CC>,
    ) -> Vec<SentPacket> {
        self.loss_timer.cancel();

        let Some(largest_acked_packet) = self.largest_acked_packet else {
            return Vec::new();
        };

        let loss_delay = path.settings.loss_delay(&path.rtt_estimator);
        let mut lost_packet_numbers = Vec::new();

        for packet in self.sent_packets.iter() {
            if packet.packet_number > largest_acked_packet {
                // sent_packets is ordered by packet number, so all remaining packets will be larger
                break;
            }

            let packet_lost_time = packet.time_sent + loss_delay;
            let time_threshold_exceeded = packet_lost_time.has_elapsed(now);
            let packet_number_threshold_exceeded =
                largest_acked_packet - packet.packet_number >= path.settings.packet_threshold;

            //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1
            //# A packet is declared lost if it meets all of the following
            //# conditions:
            //#
            //#     *  The packet is unacknowledged, in flight, and was sent prior to an
            //#        acknowledged packet.
            //#
            //#     *  The packet was sent kPacketThreshold packets before an
            //#        acknowledged packet (Section 6.1.1), or it was sent long enough in
            //#        the past (Section 6.1.2).
            if time_threshold_exceeded || packet_number_threshold_exceeded {
                lost_packet_numbers.push(packet.packet_number);
            } else {
                //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
                //# If packets sent prior to the largest acknowledged packet cannot yet
                //# be declared lost, then a timer SHOULD be set for the remaining time.
                self.loss_timer.set(packet_lost_time);

                //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
                //# The PTO timer MUST NOT be set if a timer is set for time threshold
                //# loss detection; see Section 6.1.2.
                self.pto.cancel();
                break;
            }
        }

        let lost: Vec<SentPacket> = lost_packet_numbers
            .into_iter()
            .filter_map(|packet_number| self.sent_packets.remove(packet_number))
            .collect();

        let lost_bytes: u32 = lost.iter().map(|packet| packet.sent_bytes as u32).sum();
        let largest_lost_time_sent = lost
            .iter()
            .filter(|packet| packet.is_in_flight())
            .map(|packet| packet.time_sent)
            .max();

        if let Some(largest_lost_time_sent) = largest_lost_time_sent {
            let persistent_congestion = self.is_persistent_congestion(&lost, path);
            tracing::debug!(
                space = ?self.space,
                lost_packets = lost.len(),
                lost_bytes,
                persistent_congestion,
                "packets lost"
            );
            path.congestion_controller.on_packets_lost(
                lost_bytes,
                largest_lost_time_sent,
                persistent_congestion,
                now,
            );
        }

        lost
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
    //# A sender establishes persistent congestion after the receipt of an
    //# acknowledgment if two packets that are ack-eliciting are declared
    //# lost, and:
    //#
    //# *  across all packet number spaces, none of the packets sent between
    //#    the send times of these two packets are acknowledged;
    //#
    //# *  the duration between the send times of these two packets exceeds
    //#    the persistent congestion duration (Section 7.6.1); and
    //#
    //# *  a prior RTT sample existed when these two packets were sent.
    fn is_persistent_congestion<CC: CongestionController>(
        &self,
        lost: &[SentPacket],
        path: &Path<CC>,
    ) -> bool {
        let Some(first_rtt_sample) = path.rtt_estimator.first_rtt_sample() else {
            return false;
        };

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.1
        //# (smoothed_rtt + max(4*rttvar, kGranularity) + max_ack_delay) *
        //#     kPersistentCongestionThreshold
        const K_PERSISTENT_CONGESTION_THRESHOLD: u32 = 3;
        let duration = path
            .rtt_estimator
            .pto_period(path.settings.granularity, PacketNumberSpace::ApplicationData)
            * K_PERSISTENT_CONGESTION_THRESHOLD;

        // every sent packet gets the next number, so a run of consecutive lost
        // numbers has nothing acknowledged between its ends
        let mut run_start: Option<&SentPacket> = None;
        let mut previous: Option<u64> = None;
        for packet in lost {
            let contiguous = previous.map_or(false, |prev| prev + 1 == packet.packet_number);
            previous = Some(packet.packet_number);

            if !contiguous {
                run_start = None;
            }

            if !packet.ack_eliciting || packet.time_sent <= first_rtt_sample {
                continue;
            }

            match run_start {
                None => run_start = Some(packet),
                Some(start) => {
                    if packet.time_sent.saturating_duration_since(start.time_sent) > duration {
                        return true;
                    }
                }
            }
        }

        false
    }

    #[cfg(test)]
    pub(crate) fn pto_expiration(&self) -> Option<Timestamp> {
        self.pto.expiration()
    }

    #[cfg(test)]
    pub(crate) fn loss_expiration(&self) -> Option<Timestamp> {
        self.loss_timer.expiration()
    }
}

#[cfg(test)]
mod tests;
