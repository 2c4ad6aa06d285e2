// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{Connection, Error, Event, InternalError, Status};
use bytes::Bytes;
use sluice_quic_core::{
    application,
    crypto::tls,
    frame::{self, Frame, Frames},
    packet::{decoding, CleartextPacket, PacketNumberSpace, ProtectedPacket},
    time::Timestamp,
    transport,
    varint::VarInt,
};

impl<S: tls::Session> Connection<S> {
    /// Processes a packet that was routed to this connection
    ///
    /// Returns [`InternalError::PacketIgnored`] for packets that were dropped
    /// without affecting the connection. A protocol violation closes the
    /// connection and is returned as well.
    pub fn receive(&mut self, packet: ProtectedPacket, now: Timestamp) -> Result<(), Error> {
        let ignored = Error::from(InternalError::PacketIgnored);
        self.update_time(now);

        match self.close.status() {
            Status::Idle | Status::Closing => {}
            // packets are dropped silently while draining
            Status::Draining => return Ok(()),
            Status::Closed => return Err(ignored),
        }

        if packet.is_long_header() && !packet.is_supported_version() {
            tracing::debug!(version = ?packet.version(), "unsupported version");
            return Err(ignored);
        }

        let destination_connection_id = *packet.destination_connection_id();
        ensure!(
            destination_connection_id == self.local_id
                || (packet.is_long_header()
                    && destination_connection_id == self.original_destination_id),
            Err(ignored)
        );

        let space = packet.space();
        ensure!(let Some(packet_space) = self.spaces.get(space), Err(ignored));

        let packet = match packet
            .unprotect_and_decrypt(&*packet_space.keys.opener, packet_space.largest_received())
        {
            Ok(packet) => packet,
            Err(decoding::Error::ProtocolViolation(reason)) => {
                let error = transport::Error::PROTOCOL_VIOLATION.with_reason(reason);
                self.close(error.into());
                return Err(error.into());
            }
            Err(error) => {
                tracing::debug!(?space, %error, "dropping packet");
                return Err(ignored);
            }
        };

        self.bytes_received += packet.packet_len as u64;

        let is_ack_eliciting = Frames::new(&packet.payload)
            .any(|frame| frame.map_or(false, |frame| frame.is_ack_eliciting()));

        //= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
        //# A receiver MUST discard a newly unprotected packet unless it is certain
        //# that it has not processed another packet with the same packet number
        //# from the same packet number space.
        let Some(packet_space) = self.spaces.get_mut(space) else {
            return Err(ignored);
        };
        ensure!(
            packet_space.ack_manager.on_packet_received(
                packet.packet_number,
                is_ack_eliciting,
                now
            ),
            Ok(())
        );

        tracing::trace!(
            ?space,
            packet_number = packet.packet_number,
            len = packet.packet_len,
            "packet received"
        );

        if matches!(self.close.status(), Status::Closing) {
            self.close.on_packet_received();
            self.on_closing_packet(&packet, now);
            return Ok(());
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-7.2
        //# Upon receipt of a packet from the server, the client
        //# MUST switch to using the Source Connection ID chosen by the server
        if !self.is_peer_id_confirmed {
            if let Some(source_connection_id) = packet.source_connection_id {
                self.peer_id = source_connection_id;
                self.is_peer_id_confirmed = true;
            }
        }

        if space.is_handshake() && self.endpoint_type.is_server() {
            //= https://www.rfc-editor.org/rfc/rfc9000#section-8.1
            //# In particular, receipt of a packet protected with Handshake keys
            //# confirms that the peer successfully processed an Initial packet.
            self.is_address_validated = true;

            //= https://www.rfc-editor.org/rfc/rfc9001#section-4.9.1
            //# a server MUST discard Initial keys when it
            //# first successfully processes a Handshake packet.
            self.spaces
                .discard(PacketNumberSpace::Initial, &mut self.path);
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-10.1
        //# An endpoint restarts its idle timer when a packet from its peer is
        //# received and processed successfully.
        self.restart_idle_timer(now);
        self.reset_idle_timer_on_send = true;

        if let Err(error) = self.process_packet(space, &packet.payload, now) {
            tracing::debug!(%error, "closing on protocol violation");
            let error = Error::from(error);
            self.close(error.clone());
            return Err(error);
        }

        self.flush_stream_events();
        Ok(())
    }

    fn process_packet(
        &mut self,
        space: PacketNumberSpace,
        payload: &Bytes,
        now: Timestamp,
    ) -> Result<(), transport::Error> {
        self.on_payload(space, payload, now)?;

        // the peer may have sent handshake messages that the session now consumes
        if matches!(self.close.status(), Status::Idle) {
            self.poll_handshake()?;
        }

        Ok(())
    }

    fn on_payload(
        &mut self,
        space: PacketNumberSpace,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<(), transport::Error> {
        for frame in Frames::new(payload) {
            let frame = frame?;
            let frame_type = VarInt::from_u8(frame.tag());

            //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
            //# An endpoint MUST treat
            //# receipt of a frame in a packet type that is not permitted as a
            //# connection error of type PROTOCOL_VIOLATION.
            ensure!(
                frame.is_allowed_in(space),
                Err(transport::Error::PROTOCOL_VIOLATION
                    .with_frame_type(frame_type)
                    .with_reason("frame not permitted in this packet type"))
            );

            self.on_frame(space, frame, now).map_err(|error| {
                if error.frame_type.is_some() {
                    error
                } else {
                    error.with_frame_type(frame_type)
                }
            })?;

            // nothing after a CONNECTION_CLOSE is processed
            if !matches!(self.close.status(), Status::Idle) {
                break;
            }
        }

        Ok(())
    }

    fn on_frame(
        &mut self,
        space: PacketNumberSpace,
        frame: Frame,
        now: Timestamp,
    ) -> Result<(), transport::Error> {
        match frame {
            Frame::Padding(_) | Frame::Ping(_) => {}
            Frame::Ack(ack) => {
                let Some(packet_space) = self.spaces.get_mut(space) else {
                    return Ok(());
                };
                let outcome = packet_space.recovery_manager.on_ack_frame(
                    &ack,
                    now,
                    &mut self.path,
                    self.is_handshake_confirmed,
                )?;
                self.on_recovery_outcome(space, outcome);
            }
            Frame::Crypto(crypto) => {
                if let Some(packet_space) = self.spaces.get_mut(space) {
                    packet_space.crypto_stream.on_crypto_frame(&crypto)?;
                }
            }
            Frame::Stream(stream) => self.streams.on_stream_frame(&stream)?,
            Frame::ResetStream(reset) => self.streams.on_reset_stream(&reset)?,
            Frame::StopSending(stop) => self.streams.on_stop_sending(&stop)?,
            Frame::MaxStreamData(max) => self.streams.on_max_stream_data(&max)?,
            Frame::StreamDataBlocked(blocked) => self.streams.on_stream_data_blocked(&blocked)?,
            Frame::MaxData(max) => self.streams.on_max_data(&max),
            Frame::DataBlocked(blocked) => self.streams.on_data_blocked(&blocked),
            Frame::MaxStreams(max) => self.streams.on_max_streams(&max),
            Frame::StreamsBlocked(blocked) => self.streams.on_streams_blocked(&blocked),
            Frame::ConnectionClose(close) => self.on_connection_close(&close, now),
            Frame::HandshakeDone(_) => {
                //= https://www.rfc-editor.org/rfc/rfc9000#section-19.20
                //# A server MUST
                //# treat receipt of a HANDSHAKE_DONE frame as a connection error of
                //# type PROTOCOL_VIOLATION.
                ensure!(
                    self.endpoint_type.is_client(),
                    Err(transport::Error::PROTOCOL_VIOLATION
                        .with_reason("HANDSHAKE_DONE sent by a client"))
                );

                //= https://www.rfc-editor.org/rfc/rfc9001#section-4.1.2
                //# At the client, the handshake is
                //# considered confirmed when a HANDSHAKE_DONE frame is received.
                self.on_handshake_confirmed();
            }
        }

        Ok(())
    }

    /// Looks for the peer's CONNECTION_CLOSE while the connection is closing
    fn on_closing_packet(&mut self, packet: &CleartextPacket, now: Timestamp) {
        let close = Frames::new(&packet.payload).find_map(|frame| match frame {
            Ok(Frame::ConnectionClose(close)) => Some(close),
            _ => None,
        });
        if let Some(close) = close {
            self.on_connection_close(&close, now);
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.2
    //# The draining state is entered once an endpoint receives a
    //# CONNECTION_CLOSE frame, which indicates that its peer is closing or
    //# draining.
    fn on_connection_close(&mut self, close: &frame::ConnectionClose, now: Timestamp) {
        let error = match close.frame_type {
            Some(frame_type) => Error::transport(close.error_code, Some(frame_type), close.reason),
            None => Error::application(application::Error::from(close.error_code), close.reason),
        };

        tracing::debug!(%error, code = error.to_packed(), "peer closed the connection");

        let was_closing = matches!(self.close.status(), Status::Closing);
        self.close.drain(self.path.close_timeout(), now);
        self.idle_timer.cancel();

        // a locally initiated close already decided the reason
        if !was_closing {
            self.close_reason.get_or_insert(error.clone());
            self.events.push_back(Event::ConnectionClosed { error });
        }
    }
}
