// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The connection state machine
//!
//! A [`Connection`] owns everything that belongs to one QUIC connection: the
//! three packet number spaces, the path with its RTT estimate and congestion
//! controller, the streams and the handshake session. It performs no I/O;
//! callers feed it packets with [`Connection::receive`], drain datagrams with
//! [`Connection::poll_transmit`] and drive its timers with
//! [`Connection::next_timeout`] and [`Connection::on_timeout`].

use crate::{
    endpoint,
    path::Path,
    recovery::{self, SentFrame},
    space::PacketSpaceManager,
    stream::{self, Stream, StreamError, StreamId, StreamType},
    sync::flag::HandshakeDone,
};
use alloc::collections::VecDeque;
use core::{task::Poll, time::Duration};
use sluice_quic_core::{
    ack, application,
    crypto::{tls, Keys},
    packet::{PacketNumberSpace, ProtectedPacket},
    random,
    recovery::NewReno,
    time::{Timer, Timestamp},
    transport::{self, parameters::TransportParameters},
};

mod close;
mod event;
mod handshake;
mod receive;
mod transmit;

use close::{CloseSender, Status};
use handshake::HandshakeContext;

pub use crate::flow_control::DataCredit;
pub use event::Event;
pub use sluice_quic_core::connection::{Error, Id, InternalError, Limits, MAX_REASON_LEN};

/// Possible states of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// The connection is performing the handshake
    Handshaking,
    /// The handshake completed
    Connected,
    /// The connection was closed locally and CONNECTION_CLOSE is sent in
    /// response to incoming packets
    Closing,
    /// The peer closed the connection; nothing is sent anymore
    Draining,
    /// The closing period ended and the connection can be freed
    Freeable,
}

impl State {
    /// Returns `true` if the connection is closing, draining or can be freed
    #[inline]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Draining | Self::Freeable)
    }
}

#[derive(Debug)]
pub struct Connection<S: tls::Session> {
    endpoint_type: endpoint::Type,
    config: endpoint::Config,
    local_id: Id,
    peer_id: Id,
    /// The Destination Connection ID of the client's first Initial packet
    original_destination_id: Id,
    /// Set once the client switched to the connection ID the server chose
    is_peer_id_confirmed: bool,
    session: S,
    spaces: PacketSpaceManager,
    path: Path<NewReno>,
    streams: stream::Manager,
    peer_parameters: Option<TransportParameters>,
    is_handshake_complete: bool,
    is_handshake_confirmed: bool,
    handshake_done: HandshakeDone,
    /// Set once the peer proved it can receive at its address
    is_address_validated: bool,
    bytes_received: u64,
    bytes_sent: u64,
    idle_timer: Timer,
    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.1
    //# An endpoint also restarts its
    //# idle timer when sending an ack-eliciting packet if no other ack-
    //# eliciting packets have been sent since last receiving and processing
    //# a packet.
    reset_idle_timer_on_send: bool,
    close: CloseSender,
    close_reason: Option<Error>,
    events: VecDeque<Event>,
    /// The latest time any entry point was called with
    latest_time: Timestamp,
}

impl<S: tls::Session> Connection<S> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        endpoint_type: endpoint::Type,
        config: endpoint::Config,
        local_id: Id,
        peer_id: Id,
        original_destination_id: Id,
        session: S,
        initial_keys: Keys,
        now: Timestamp,
    ) -> Self {
        let limits = *config.limits();
        let max_datagram_size = config.max_datagram_size();

        let mut spaces = PacketSpaceManager::default();
        spaces.install(PacketNumberSpace::Initial, initial_keys, ack::Settings::EARLY);

        let mut idle_timer = Timer::default();
        if let Some(timeout) = limits.max_idle_timeout() {
            idle_timer.set(now + timeout);
        }

        Self {
            endpoint_type,
            config,
            local_id,
            peer_id,
            original_destination_id,
            is_peer_id_confirmed: endpoint_type.is_server(),
            session,
            spaces,
            path: Path::new(
                *config.recovery_settings(),
                NewReno::new(max_datagram_size),
                max_datagram_size,
            ),
            streams: stream::Manager::new(endpoint_type, limits),
            peer_parameters: None,
            is_handshake_complete: false,
            is_handshake_confirmed: false,
            handshake_done: HandshakeDone::default(),
            //= https://www.rfc-editor.org/rfc/rfc9000#section-8
            //# Clients are not subject to the amplification limit
            is_address_validated: endpoint_type.is_client(),
            bytes_received: 0,
            bytes_sent: 0,
            idle_timer,
            reset_idle_timer_on_send: false,
            close: CloseSender::default(),
            close_reason: None,
            events: VecDeque::new(),
            latest_time: now,
        }
    }

    /// Starts a client connection
    ///
    /// The first flight is queued right away and produced by the next
    /// [`Self::poll_transmit`] call.
    pub fn connect<E, R>(
        config: endpoint::Config,
        endpoint: &mut E,
        server_name: &str,
        random: &mut R,
        now: Timestamp,
    ) -> Result<Self, Error>
    where
        E: tls::Endpoint<Session = S>,
        R: random::Generator + ?Sized,
    {
        let local_id = Id::generate(random);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-7.2
        //# When an Initial packet is sent by a client that has not previously
        //# received an Initial or Retry packet from the server, the client
        //# populates the Destination Connection ID field with an unpredictable
        //# value.  This Destination Connection ID MUST be at least 8 bytes in
        //# length.
        let original_destination_id = Id::generate(random);

        let parameters = config
            .limits()
            .transport_parameters(config.max_datagram_size());
        let session = endpoint.new_client_session(&parameters, server_name);
        let keys = endpoint.initial_keys(
            endpoint::Type::Client,
            original_destination_id.as_bytes(),
        );

        let mut connection = Self::new(
            endpoint::Type::Client,
            config,
            local_id,
            original_destination_id,
            original_destination_id,
            session,
            keys,
            now,
        );
        connection.poll_handshake()?;

        tracing::debug!(?local_id, server_name, "connecting");
        Ok(connection)
    }

    /// Creates a server connection from the first Initial packet of a client
    ///
    /// A non-empty `token` marks the client address as validated; verifying it is up
    /// to the caller.
    pub fn accept<E, R>(
        config: endpoint::Config,
        endpoint: &mut E,
        packet: ProtectedPacket,
        token: Option<&[u8]>,
        random: &mut R,
        now: Timestamp,
    ) -> Result<Self, Error>
    where
        E: tls::Endpoint<Session = S>,
        R: random::Generator + ?Sized,
    {
        let ignored = Error::from(InternalError::PacketIgnored);

        ensure!(packet.space().is_initial(), Err(ignored));

        //= https://www.rfc-editor.org/rfc/rfc9000#section-6
        //# A server that receives a packet with an unsupported version
        //# from a client MUST NOT establish a connection for it.
        ensure!(packet.is_supported_version(), Err(ignored));

        ensure!(
            let Some(peer_id) = packet.source_connection_id().copied(),
            Err(ignored)
        );
        let original_destination_id = *packet.destination_connection_id();

        //= https://www.rfc-editor.org/rfc/rfc9000#section-7.2
        //# This Destination Connection ID MUST be at least 8 bytes in
        //# length.
        ensure!(original_destination_id.len() >= 8, Err(ignored));

        let local_id = Id::generate(random);
        let parameters = config
            .limits()
            .transport_parameters(config.max_datagram_size());
        let session = endpoint.new_server_session(&parameters);
        let keys = endpoint.initial_keys(
            endpoint::Type::Server,
            original_destination_id.as_bytes(),
        );

        let mut connection = Self::new(
            endpoint::Type::Server,
            config,
            local_id,
            peer_id,
            original_destination_id,
            session,
            keys,
            now,
        );

        //= https://www.rfc-editor.org/rfc/rfc9000#section-8.1.3
        //# If the client has a token received in a NEW_TOKEN frame on a
        //# previous connection to what it believes to be the same server, it
        //# SHOULD include that value in the Token field of its Initial packet.
        connection.is_address_validated = token.map_or(false, |token| !token.is_empty());

        tracing::debug!(?local_id, ?peer_id, "accepting");

        // protocol errors leave a closing connection behind so CONNECTION_CLOSE is sent
        match connection.receive(packet, now) {
            Err(Error::Internal(error)) => Err(error.into()),
            _ => Ok(connection),
        }
    }

    #[inline]
    pub fn endpoint_type(&self) -> endpoint::Type {
        self.endpoint_type
    }

    #[inline]
    pub fn local_id(&self) -> &Id {
        &self.local_id
    }

    #[inline]
    pub fn peer_id(&self) -> &Id {
        &self.peer_id
    }

    #[inline]
    pub fn original_destination_id(&self) -> &Id {
        &self.original_destination_id
    }

    pub fn state(&self) -> State {
        match self.close.status() {
            Status::Idle if self.is_handshake_complete => State::Connected,
            Status::Idle => State::Handshaking,
            Status::Closing => State::Closing,
            Status::Draining => State::Draining,
            Status::Closed => State::Freeable,
        }
    }

    #[inline]
    pub fn is_handshake_confirmed(&self) -> bool {
        self.is_handshake_confirmed
    }

    /// Returns the transport parameters the peer sent in the handshake
    #[inline]
    pub fn peer_parameters(&self) -> Option<&TransportParameters> {
        self.peer_parameters.as_ref()
    }

    /// Returns why the connection closed, if it did
    #[inline]
    pub fn close_reason(&self) -> Option<&Error> {
        self.close_reason.as_ref()
    }

    #[inline]
    pub fn path(&self) -> &Path<NewReno> {
        &self.path
    }

    /// Returns the next queued event
    pub fn poll_event(&mut self) -> Option<Event> {
        self.flush_stream_events();
        self.events.pop_front()
    }

    fn flush_stream_events(&mut self) {
        while let Some(event) = self.streams.poll_event() {
            self.events.push_back(event);
        }
    }

    // Streams

    #[inline]
    fn ensure_open(&self) -> Result<(), StreamError> {
        ensure!(
            matches!(self.close.status(), Status::Idle),
            Err(StreamError::ConnectionClosed)
        );
        Ok(())
    }

    /// Opens a locally initiated stream
    ///
    /// Returns [`StreamError::StreamIdLimit`] while the peer doesn't allow
    /// another stream; the call can be retried once it raised the limit.
    pub fn open_stream(&mut self, stream_type: StreamType) -> Result<StreamId, StreamError> {
        self.ensure_open()?;
        self.streams.open(stream_type)
    }

    #[inline]
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(id)
    }

    #[inline]
    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(id)
    }

    /// Returns the connection level flow control credit in both directions
    #[inline]
    pub fn data_credit(&self) -> DataCredit {
        self.streams.data_credit()
    }

    /// Returns the number of streams the connection still tracks
    #[inline]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream_write(&mut self, id: StreamId, bytes: &[u8]) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.streams.write(id, bytes)
    }

    pub fn stream_shutdown(&mut self, id: StreamId) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.streams.shutdown(id)
    }

    /// Returns the contiguous bytes that can be read from the stream
    pub fn stream_readable(&self, id: StreamId) -> Result<&[u8], StreamError> {
        self.streams.readable(id)
    }

    /// Marks `len` readable bytes as consumed, returning their credit to the peer
    pub fn stream_consume(&mut self, id: StreamId, len: usize) -> Result<usize, StreamError> {
        self.streams.consume(id, len)
    }

    pub fn reset_stream(
        &mut self,
        id: StreamId,
        error: application::Error,
    ) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.streams.reset(id, error)
    }

    pub fn request_stop(
        &mut self,
        id: StreamId,
        error: application::Error,
    ) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.streams.request_stop(id, error)
    }

    /// Detaches the application from the stream
    ///
    /// The stream is removed once both of its halves reached a terminal state.
    pub fn release_stream(&mut self, id: StreamId) -> Result<(), StreamError> {
        self.streams.release(id)
    }

    // Closing

    /// Closes the connection with `error`
    ///
    /// A CONNECTION_CLOSE frame goes out with the next transmission. Closing an
    /// already closed connection does nothing.
    pub fn close(&mut self, error: Error) {
        ensure!(self.close.close(error.clone()));
        tracing::debug!(%error, code = error.to_packed(), "closing");
        self.idle_timer.cancel();
        self.close_reason.get_or_insert(error);
    }

    // Timers

    /// Returns the earliest time [`Self::on_timeout`] needs to be called
    ///
    /// While a CONNECTION_CLOSE frame is waiting to be sent the deadline has
    /// already passed, so the caller polls for transmissions right away.
    pub fn next_timeout(&self) -> Option<Timestamp> {
        match self.close.status() {
            Status::Idle => [self.spaces.next_expiration(), self.idle_timer.expiration()]
                .into_iter()
                .flatten()
                .min(),
            Status::Closing if self.close.has_transmission_interest() => Some(self.latest_time),
            Status::Closing | Status::Draining => self.close.next_expiration(),
            Status::Closed => None,
        }
    }

    pub fn on_timeout(&mut self, now: Timestamp) {
        self.update_time(now);
        match self.close.status() {
            Status::Idle => {}
            Status::Closing | Status::Draining => {
                if self.close.on_timeout(now) {
                    tracing::debug!("closing period ended");
                }
                return;
            }
            Status::Closed => return,
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-10.1
        //# If a max_idle_timeout is specified by either endpoint in its
        //# transport parameters (Section 18.2), the connection is silently
        //# closed and its state is discarded when it remains idle for longer
        //# than the minimum of the max_idle_timeout value advertised by both
        //# endpoints.
        if self.idle_timer.poll_expiration(now).is_ready() {
            tracing::debug!("idle timeout");
            self.close.finish();
            self.close_reason.get_or_insert(Error::IdleTimeout);
            self.events.push_back(Event::IdleTimeout);
            return;
        }

        for space in PacketNumberSpace::ALL {
            let Some(packet_space) = self.spaces.get_mut(space) else {
                continue;
            };
            packet_space.ack_manager.on_timeout(now);
            let outcome = packet_space.recovery_manager.on_timeout(
                now,
                &mut self.path,
                self.is_handshake_confirmed,
            );
            self.on_recovery_outcome(space, outcome);
        }
    }

    #[inline]
    fn update_time(&mut self, now: Timestamp) {
        self.latest_time = self.latest_time.max(now);
    }

    /// Returns the effective idle timeout
    fn idle_timeout(&self) -> Option<Duration> {
        let local = self.config.limits().max_idle_timeout();
        let peer = self
            .peer_parameters
            .as_ref()
            .and_then(TransportParameters::max_idle_timeout);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-10.1
        //# Each endpoint advertises a max_idle_timeout, but the effective value
        //# at an endpoint is computed as the minimum of the two advertised
        //# values (or the sole advertised value, if only one endpoint advertises
        //# a non-zero value).
        let timeout = local.into_iter().chain(peer).min()?;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-10.1
        //# To avoid excessively small idle timeout periods, endpoints MUST
        //# increase the idle timeout period to be at least three times the
        //# current Probe Timeout (PTO).
        let pto = self.path.pto_period(PacketNumberSpace::ApplicationData);
        Some(timeout.max(3 * pto))
    }

    fn restart_idle_timer(&mut self, now: Timestamp) {
        match self.idle_timeout() {
            Some(timeout) => self.idle_timer.set(now + timeout),
            None => self.idle_timer.cancel(),
        }
    }

    // Handshake

    /// Feeds received CRYPTO data to the session and applies what it produced
    fn poll_handshake(&mut self) -> Result<(), transport::Error> {
        let was_complete = self.is_handshake_complete;

        let mut context = HandshakeContext {
            spaces: &mut self.spaces,
            path: &mut self.path,
            streams: &mut self.streams,
            limits: self.config.limits(),
            peer_parameters: &mut self.peer_parameters,
            is_complete: &mut self.is_handshake_complete,
        };

        if let Poll::Ready(Err(error)) = self.session.poll(&mut context) {
            return Err(error);
        }

        if !was_complete && self.is_handshake_complete {
            self.on_handshake_complete();
        }
        Ok(())
    }

    fn on_handshake_complete(&mut self) {
        tracing::debug!(endpoint = ?self.endpoint_type, "handshake complete");
        self.events.push_back(Event::HandshakeComplete);

        //= https://www.rfc-editor.org/rfc/rfc9001#section-4.1.2
        //# the TLS handshake is considered confirmed at the
        //# server when the handshake completes.
        if self.endpoint_type.is_server() {
            //= https://www.rfc-editor.org/rfc/rfc9001#section-4.1.2
            //# The server MUST send a HANDSHAKE_DONE
            //# frame as soon as the handshake is complete.
            self.handshake_done.send();
            self.on_handshake_confirmed();
        }
    }

    fn on_handshake_confirmed(&mut self) {
        ensure!(!self.is_handshake_confirmed);
        self.is_handshake_confirmed = true;

        //= https://www.rfc-editor.org/rfc/rfc9001#section-4.9.2
        //# An endpoint MUST discard its Handshake keys when the TLS handshake is
        //# confirmed (Section 4.1.2).
        self.spaces
            .discard(PacketNumberSpace::Initial, &mut self.path);
        self.spaces
            .discard(PacketNumberSpace::Handshake, &mut self.path);

        if let Some(space) = self.spaces.application_mut() {
            space.recovery_manager.update_pto_timer(&self.path, true);
        }

        tracing::debug!(endpoint = ?self.endpoint_type, "handshake confirmed");
    }

    // Recovery

    fn on_recovery_outcome(&mut self, space: PacketNumberSpace, outcome: recovery::Outcome) {
        for packet in &outcome.acked {
            for frame in &packet.frames {
                self.on_frame_acked(space, frame);
            }
        }

        for packet in &outcome.lost {
            tracing::debug!(?space, packet_number = packet.packet_number, "packet lost");
            for frame in &packet.frames {
                self.on_frame_lost(space, frame);
            }
        }

        // probes carry the outstanding data again
        for frame in &outcome.probes {
            self.on_frame_lost(space, frame);
        }
    }

    fn on_frame_acked(&mut self, space: PacketNumberSpace, frame: &SentFrame) {
        match *frame {
            SentFrame::Ping => {}
            SentFrame::HandshakeDone => self.handshake_done.on_ack(),
            SentFrame::Crypto { offset, len } => {
                if let Some(packet_space) = self.spaces.get_mut(space) {
                    packet_space.crypto_stream.on_ack(offset, len);
                }
            }
            _ => self.streams.on_ack(frame),
        }
    }

    fn on_frame_lost(&mut self, space: PacketNumberSpace, frame: &SentFrame) {
        match *frame {
            SentFrame::Ping => {}
            SentFrame::HandshakeDone => self.handshake_done.on_lost(),
            SentFrame::Crypto { offset, len } => {
                if let Some(packet_space) = self.spaces.get_mut(space) {
                    packet_space.crypto_stream.on_lost(offset, len);
                }
            }
            _ => self.streams.on_lost(frame),
        }
    }
}
