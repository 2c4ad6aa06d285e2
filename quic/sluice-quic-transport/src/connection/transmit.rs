// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{close, Connection, Error, InternalError, Status};
use crate::{
    recovery::SentPacket,
    transmission::{Constraint, Packet, WriteContext as _},
};
use alloc::vec::Vec;
use bytes::Bytes;
use sluice_quic_core::{
    crypto::tls,
    packet::{PacketEncoder, PacketNumberSpace},
    time::Timestamp,
    transport,
};

impl<S: tls::Session> Connection<S> {
    /// Produces the next datagram, or `None` if there is nothing to send
    ///
    /// Packets of every space with something to send are coalesced, from
    /// Initial to 1-RTT. Returns [`InternalError::FreeConnection`] once the
    /// closing period ended.
    pub fn poll_transmit(&mut self, now: Timestamp) -> Result<Option<Bytes>, Error> {
        self.update_time(now);
        match self.close.status() {
            Status::Idle => {}
            Status::Closing => return self.transmit_close(now),
            //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.2
            //# While otherwise identical to the closing state, an endpoint in the
            //# draining state MUST NOT send any packets.
            Status::Draining => return Ok(None),
            Status::Closed => return Err(InternalError::FreeConnection.into()),
        }

        let limit = self.send_limit();

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.5
        //# Probe packets MUST NOT be blocked by the congestion controller.
        let constraint = if self
            .spaces
            .iter()
            .any(|space| space.recovery_manager.requires_probe())
        {
            Constraint::None
        } else {
            self.path.transmission_constraint()
        };

        let mut datagram = Vec::new();
        // the last packet stays open so it can absorb the datagram padding
        let mut pending: Option<(PacketNumberSpace, Packet)> = None;
        let mut has_initial = false;
        let mut has_ack_eliciting_initial = false;

        for space in PacketNumberSpace::ALL {
            let reserved = datagram.len() + pending.as_ref().map_or(0, |(_, p)| p.encoder.len());
            let Some(packet) = self.write_packet(space, limit.saturating_sub(reserved), constraint, now)
            else {
                continue;
            };

            if space.is_initial() {
                has_initial = true;
                has_ack_eliciting_initial = packet.is_ack_eliciting();
            }

            if let Some((space, packet)) = pending.replace((space, packet)) {
                self.seal(space, packet, 0, &mut datagram, now)?;
            }
        }

        let Some((space, packet)) = pending else {
            return Ok(None);
        };

        //= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
        //# A client MUST expand the payload of all UDP datagrams carrying
        //# Initial packets to at least the smallest allowed maximum datagram
        //# size of 1200 bytes by adding PADDING frames to the Initial packet or
        //# by coalescing the Initial packet; see Section 12.2.

        //= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
        //# Similarly, a
        //# server MUST expand the payload of all UDP datagrams carrying ack-
        //# eliciting Initial packets to at least the smallest allowed maximum
        //# datagram size of 1200 bytes.
        let needs_padding = if self.endpoint_type.is_client() {
            has_initial
        } else {
            has_ack_eliciting_initial
        };
        let min_len = if needs_padding {
            limit.saturating_sub(datagram.len())
        } else {
            0
        };
        self.seal(space, packet, min_len, &mut datagram, now)?;

        Ok(Some(datagram.into()))
    }

    /// Produces up to `max_datagrams_per_send` datagrams
    pub fn send(&mut self, now: Timestamp) -> Result<Vec<Bytes>, Error> {
        let mut datagrams = Vec::new();
        while datagrams.len() < self.config.max_datagrams_per_send() {
            let Some(datagram) = self.poll_transmit(now)? else {
                break;
            };
            datagrams.push(datagram);
        }
        Ok(datagrams)
    }

    /// Returns the largest datagram the connection may send right now
    fn send_limit(&self) -> usize {
        let max_datagram_size = self.path.max_datagram_size() as usize;
        if self.is_address_validated {
            return max_datagram_size;
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-8
        //# Prior to validating the client address, servers MUST NOT send more
        //# than three times as many bytes as the number of bytes they have
        //# received.
        let budget = (3 * self.bytes_received).saturating_sub(self.bytes_sent);
        budget.min(max_datagram_size as u64) as usize
    }

    /// Fills a packet for `space` with whatever it has to send
    fn write_packet(
        &mut self,
        space: PacketNumberSpace,
        capacity: usize,
        constraint: Constraint,
        now: Timestamp,
    ) -> Option<Packet> {
        let carries_streams = space.is_application_data() && self.is_handshake_complete;
        let Self {
            spaces,
            streams,
            handshake_done,
            local_id,
            peer_id,
            ..
        } = self;
        let packet_space = spaces.get_mut(space)?;

        let has_frames = constraint.can_transmit()
            && (packet_space.crypto_stream.has_transmission_interest()
                || (carries_streams
                    && (handshake_done.has_transmission_interest()
                        || streams.has_transmission_interest())));
        let requires_probe = packet_space.recovery_manager.requires_probe();

        //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.1
        //# When an endpoint sends a packet
        //# for other reasons, it SHOULD include an ACK frame
        let ack_manager = &packet_space.ack_manager;
        let includes_ack = ack_manager.should_transmit(now)
            || ((has_frames || requires_probe) && ack_manager.has_new_ranges());

        ensure!(has_frames || requires_probe || includes_ack, None);

        let encoder = PacketEncoder::new(
            space,
            peer_id,
            local_id,
            &[],
            packet_space.next_packet_number(),
            packet_space.largest_acked(),
            capacity,
            &*packet_space.keys.sealer,
        )?;
        let mut packet = Packet::new(encoder, now, constraint);

        if includes_ack {
            packet_space.ack_manager.on_transmit(&mut packet);
        }

        if has_frames {
            packet_space.crypto_stream.on_transmit(&mut packet);
            if carries_streams {
                handshake_done.on_transmit(&mut packet);
                streams.on_transmit(&mut packet);
            }
        }

        packet_space.recovery_manager.on_transmit(&mut packet);

        ensure!(!packet.encoder.is_empty(), None);
        Some(packet)
    }

    /// Protects `packet`, appends it to `datagram` and starts tracking it
    fn seal(
        &mut self,
        space: PacketNumberSpace,
        packet: Packet,
        min_len: usize,
        datagram: &mut Vec<u8>,
        now: Timestamp,
    ) -> Result<(), Error> {
        let is_ack_eliciting = packet.is_ack_eliciting();
        let Packet {
            encoder, frames, ..
        } = packet;
        let packet_number = encoder.packet_number();

        let packet_space = self
            .spaces
            .get_mut(space)
            .ok_or(transport::Error::INTERNAL_ERROR.with_reason("packet space discarded"))?;
        let bytes = encoder
            .finish(&*packet_space.keys.sealer, min_len)
            .map_err(|_| transport::Error::INTERNAL_ERROR.with_reason("packet protection failed"))?;
        packet_space.on_packet_sent(packet_number);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-2
        //# In-flight:  Packets are considered in flight when they are ack-
        //#    eliciting or contain a PADDING frame, and they have been sent but
        //#    are not acknowledged, declared lost, or abandoned along with old
        //#    keys.
        let is_in_flight = is_ack_eliciting || min_len > 0;
        packet_space.recovery_manager.on_packet_sent(
            SentPacket {
                packet_number,
                time_sent: now,
                sent_bytes: if is_in_flight { bytes.len() as u16 } else { 0 },
                ack_eliciting: is_ack_eliciting,
                frames,
            },
            &mut self.path,
            self.is_handshake_confirmed,
        );

        tracing::trace!(
            ?space,
            packet_number,
            len = bytes.len(),
            ack_eliciting = is_ack_eliciting,
            "packet sent"
        );

        self.bytes_sent += bytes.len() as u64;
        datagram.extend_from_slice(&bytes);

        if is_ack_eliciting && self.reset_idle_timer_on_send {
            self.reset_idle_timer_on_send = false;
            self.restart_idle_timer(now);
        }

        //= https://www.rfc-editor.org/rfc/rfc9001#section-4.9.1
        //# Thus, a client MUST discard Initial keys when it first sends a
        //# Handshake packet and a server MUST discard Initial keys when it
        //# first successfully processes a Handshake packet.
        if space.is_handshake() && self.endpoint_type.is_client() {
            self.spaces
                .discard(PacketNumberSpace::Initial, &mut self.path);
        }

        Ok(())
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.3
    //# When sending CONNECTION_CLOSE, the goal is to ensure that the peer
    //# will process the frame.  Generally, this means sending the frame in
    //# a packet with the highest level of packet protection to avoid the
    //# packet being discarded.

    /// Produces a datagram with a CONNECTION_CLOSE frame in every space that has keys
    fn transmit_close(&mut self, now: Timestamp) -> Result<Option<Bytes>, Error> {
        ensure!(self.close.has_transmission_interest(), Ok(None));
        ensure!(let Some(error) = self.close.error().cloned(), Ok(None));

        let limit = self.send_limit();
        let mut encoders = Vec::new();
        let mut reserved = 0;

        for space in PacketNumberSpace::ALL {
            let Some(packet_space) = self.spaces.get(space) else {
                continue;
            };
            let Some(mut encoder) = PacketEncoder::new(
                space,
                &self.peer_id,
                &self.local_id,
                &[],
                packet_space.next_packet_number(),
                packet_space.largest_acked(),
                limit.saturating_sub(reserved),
                &*packet_space.keys.sealer,
            ) else {
                continue;
            };
            if encoder.encode_frame(&close::close_frame(&error, space)) {
                reserved += encoder.len();
                encoders.push((space, encoder));
            }
        }

        let needs_padding = self.endpoint_type.is_client()
            && encoders.iter().any(|(space, _)| space.is_initial());
        let count = encoders.len();
        let mut datagram = Vec::new();

        for (index, (space, encoder)) in encoders.into_iter().enumerate() {
            let min_len = if needs_padding && index + 1 == count {
                limit.saturating_sub(datagram.len())
            } else {
                0
            };
            let Some(packet_space) = self.spaces.get_mut(space) else {
                continue;
            };
            let packet_number = encoder.packet_number();
            let bytes = encoder
                .finish(&*packet_space.keys.sealer, min_len)
                .map_err(|_| transport::Error::INTERNAL_ERROR.with_reason("packet protection failed"))?;
            packet_space.on_packet_sent(packet_number);
            datagram.extend_from_slice(&bytes);
        }

        ensure!(!datagram.is_empty(), Ok(None));

        tracing::debug!(len = datagram.len(), "sent CONNECTION_CLOSE");
        self.bytes_sent += datagram.len() as u64;
        self.close.on_transmit(self.path.close_timeout(), now);
        Ok(Some(datagram.into()))
    }
}
