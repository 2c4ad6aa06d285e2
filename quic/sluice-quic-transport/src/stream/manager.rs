// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{ReceiveStream, SendStream, Stream};
use crate::{
    connection::Event,
    flow_control::{
        DataBlockedWriter, DataCredit, IncomingController, MaxDataWriter, MaxStreamsWriter,
        OutgoingController, StreamsBlockedWriter,
    },
    recovery::SentFrame,
    transmission::WriteContext,
};
use alloc::{collections::VecDeque, vec::Vec};
use hashbrown::HashMap;
use sluice_quic_core::{
    application,
    connection::Limits,
    endpoint, frame,
    stream::{StreamError, StreamId, StreamType},
    transport::{self, parameters::TransportParameters},
    varint::VarInt,
};

/// State kept once per stream type
#[derive(Debug)]
struct PerType<T> {
    bidirectional: T,
    unidirectional: T,
}

impl<T> PerType<T> {
    #[inline]
    fn get_mut(&mut self, stream_type: StreamType) -> &mut T {
        match stream_type {
            StreamType::Bidirectional => &mut self.bidirectional,
            StreamType::Unidirectional => &mut self.unidirectional,
        }
    }

    #[inline]
    fn get(&self, stream_type: StreamType) -> &T {
        match stream_type {
            StreamType::Bidirectional => &self.bidirectional,
            StreamType::Unidirectional => &self.unidirectional,
        }
    }
}

/// Which half of a stream a received frame addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Half {
    Send,
    Receive,
}

/// Owns every stream of a connection
#[derive(Debug)]
pub struct Manager {
    local: endpoint::Type,
    limits: Limits,
    peer_parameters: TransportParameters,
    streams: HashMap<StreamId, Stream>,
    /// The lowest stream id not opened yet, per initiator and type
    next_local: PerType<Option<StreamId>>,
    next_remote: PerType<Option<StreamId>>,
    /// Stream counts the peer allows us to open
    local_limits: PerType<OutgoingController<StreamsBlockedWriter>>,
    /// Stream counts we allow the peer to open
    remote_limits: PerType<IncomingController<MaxStreamsWriter>>,
    incoming: IncomingController<MaxDataWriter>,
    outgoing: OutgoingController<DataBlockedWriter>,
    events: VecDeque<Event>,
}

impl Manager {
    pub fn new(local: endpoint::Type, limits: Limits) -> Self {
        let peer = local.peer_type();
        let zero = VarInt::from_u8(0);
        Self {
            local,
            limits,
            peer_parameters: TransportParameters::default(),
            streams: HashMap::new(),
            next_local: PerType {
                bidirectional: Some(StreamId::initial(local, StreamType::Bidirectional)),
                unidirectional: Some(StreamId::initial(local, StreamType::Unidirectional)),
            },
            next_remote: PerType {
                bidirectional: Some(StreamId::initial(peer, StreamType::Bidirectional)),
                unidirectional: Some(StreamId::initial(peer, StreamType::Unidirectional)),
            },
            local_limits: PerType {
                bidirectional: OutgoingController::new(
                    zero,
                    StreamsBlockedWriter(StreamType::Bidirectional),
                ),
                unidirectional: OutgoingController::new(
                    zero,
                    StreamsBlockedWriter(StreamType::Unidirectional),
                ),
            },
            remote_limits: PerType {
                bidirectional: IncomingController::new(
                    limits.max_open_bidirectional_streams(),
                    MaxStreamsWriter(StreamType::Bidirectional),
                ),
                unidirectional: IncomingController::new(
                    limits.max_open_unidirectional_streams(),
                    MaxStreamsWriter(StreamType::Unidirectional),
                ),
            },
            incoming: IncomingController::new(limits.data_window(), MaxDataWriter),
            //= https://www.rfc-editor.org/rfc/rfc9000#section-7.4.1
            //# An endpoint MUST NOT send data on any stream without a non-zero
            //# initial_max_data in the peer's transport parameters.
            outgoing: OutgoingController::new(zero, DataBlockedWriter),
            events: VecDeque::new(),
        }
    }

    /// Applies the limits the peer advertised in its transport parameters
    pub fn on_peer_parameters(&mut self, parameters: &TransportParameters) {
        self.peer_parameters = *parameters;
        self.outgoing.on_max_update(parameters.initial_max_data);
        self.local_limits
            .bidirectional
            .on_max_update(parameters.initial_max_streams_bidi);
        self.local_limits
            .unidirectional
            .on_max_update(parameters.initial_max_streams_uni);
    }

    /// Returns the next stream event
    #[inline]
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    #[inline]
    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Returns the number of streams that weren't removed yet
    #[inline]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Returns the connection credit the peer granted but that wasn't used
    #[inline]
    pub fn connection_send_credit(&self) -> u64 {
        self.outgoing.available()
    }

    /// Returns the connection credit granted to the peer
    #[inline]
    pub fn connection_receive_limit(&self) -> u64 {
        self.incoming.limit()
    }

    #[inline]
    pub fn data_credit(&self) -> DataCredit {
        DataCredit {
            send_limit: self.outgoing.limit(),
            sent: self.outgoing.sent(),
            receive_limit: self.incoming.limit(),
            received: self.incoming.received(),
        }
    }

    /// Creates the halves of `id` with their initial flow control windows
    fn create(&self, id: StreamId) -> Stream {
        let is_local = id.initiator() == self.local;
        let max_buffer_size = self.limits.max_send_buffer_size();
        let peer = &self.peer_parameters;

        let send = id.has_send_half(self.local).then(|| {
            //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
            //# initial_max_stream_data_bidi_remote (0x06):  This parameter is an
            //#    integer value specifying the initial flow control limit for
            //#    peer-initiated bidirectional streams.
            let credit = match (id.stream_type(), is_local) {
                (StreamType::Unidirectional, _) => peer.initial_max_stream_data_uni,
                (StreamType::Bidirectional, true) => peer.initial_max_stream_data_bidi_remote,
                (StreamType::Bidirectional, false) => peer.initial_max_stream_data_bidi_local,
            };
            SendStream::new(id, credit, max_buffer_size)
        });

        let receive = id.has_receive_half(self.local).then(|| {
            let window = match (id.stream_type(), is_local) {
                (StreamType::Unidirectional, _) => self.limits.unidirectional_data_window(),
                (StreamType::Bidirectional, true) => self.limits.bidirectional_local_data_window(),
                (StreamType::Bidirectional, false) => {
                    self.limits.bidirectional_remote_data_window()
                }
            };
            ReceiveStream::new(id, window)
        });

        Stream::new(id, send, receive)
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-4.6
    //# An endpoint that is unable to open a new stream due to the peer's
    //# limits SHOULD send a STREAMS_BLOCKED frame (Section 19.14).

    /// Opens a locally initiated stream
    pub fn open(&mut self, stream_type: StreamType) -> Result<StreamId, StreamError> {
        let limit = self.local_limits.get_mut(stream_type);
        if limit.available() == 0 {
            limit.on_blocked();
            return Err(StreamError::StreamIdLimit);
        }

        let next = self.next_local.get_mut(stream_type);
        let id = next.ok_or(StreamError::StreamIdLimit)?;
        *next = id.next_of_type();
        self.local_limits.get_mut(stream_type).on_sent(1);

        let stream = self.create(id);
        self.streams.insert(id, stream);
        tracing::debug!(stream_id = %id, "stream opened");
        Ok(id)
    }

    /// Opens every remote stream up to `id` and validates the addressed half
    fn open_if_necessary(&mut self, id: StreamId, half: Half) -> Result<(), transport::Error> {
        let has_half = match half {
            Half::Send => id.has_send_half(self.local),
            Half::Receive => id.has_receive_half(self.local),
        };

        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.8
        //# An endpoint MUST terminate the connection with error
        //# STREAM_STATE_ERROR if it receives a STREAM frame for a locally
        //# initiated stream that has not yet been created, or for a send-only
        //# stream.
        ensure!(
            has_half,
            Err(transport::Error::STREAM_STATE_ERROR.with_reason("frame for a missing stream half"))
        );

        if id.initiator() == self.local {
            let next = *self.next_local.get(id.stream_type());
            ensure!(
                next.map_or(true, |next| id < next),
                Err(transport::Error::STREAM_STATE_ERROR
                    .with_reason("frame for a stream that was never opened"))
            );
            return Ok(());
        }

        let next = self.next_remote.get_mut(id.stream_type());
        // streams below the next id were opened before, and may be removed
        ensure!(let Some(first_unopened) = *next, Ok(()));
        ensure!(id >= first_unopened, Ok(()));

        //= https://www.rfc-editor.org/rfc/rfc9000#section-4.6
        //# An endpoint
        //# that receives a frame with a stream ID exceeding the limit it has
        //# sent MUST treat this as a connection error of type
        //# STREAM_LIMIT_ERROR
        let count = id.index() - first_unopened.index() + 1;
        self.remote_limits
            .get_mut(id.stream_type())
            .on_receive(count)
            .map_err(|_| {
                transport::Error::STREAM_LIMIT_ERROR.with_reason("stream limit exceeded")
            })?;
        *next = id.next_of_type();

        //= https://www.rfc-editor.org/rfc/rfc9000#section-3.2
        //# Before a stream is created, all streams of the same type with lower-
        //# numbered stream IDs MUST be created.
        let mut current = Some(first_unopened);
        while let Some(stream_id) = current.filter(|stream_id| *stream_id <= id) {
            let stream = self.create(stream_id);
            self.streams.insert(stream_id, stream);
            self.events.push_back(Event::StreamOpened { id: stream_id });
            tracing::debug!(stream_id = %stream_id, "remote stream opened");
            current = stream_id.next_of_type();
        }

        Ok(())
    }

    /// Removes the stream if both halves are done and the application released it
    fn remove_if_done(&mut self, id: StreamId) {
        ensure!(self.streams.get(&id).map_or(false, Stream::is_removable));
        ensure!(let Some(mut stream) = self.streams.remove(&id), ());

        if let Some(receive) = stream.receive.as_mut() {
            receive.release_unread_credit(&mut self.incoming);
        }

        // the peer may open another stream in its place
        if id.initiator() != self.local {
            self.remote_limits.get_mut(id.stream_type()).release(1);
        }

        tracing::debug!(stream_id = %id, "stream removed");
    }

    #[inline]
    fn stream_mut(&mut self, id: StreamId) -> Result<&mut Stream, StreamError> {
        self.streams.get_mut(&id).ok_or(StreamError::InvalidStream)
    }

    #[inline]
    fn send_mut(&mut self, id: StreamId) -> Result<&mut SendStream, StreamError> {
        self.stream_mut(id)?
            .send
            .as_mut()
            .ok_or(StreamError::NonWritable)
    }

    // Application API

    pub fn write(&mut self, id: StreamId, bytes: &[u8]) -> Result<(), StreamError> {
        self.send_mut(id)?.write(bytes)
    }

    pub fn shutdown(&mut self, id: StreamId) -> Result<(), StreamError> {
        self.send_mut(id)?.shutdown()
    }

    /// Resets the send half; resetting twice is not an error
    pub fn reset(&mut self, id: StreamId, error: application::Error) -> Result<(), StreamError> {
        self.send_mut(id)?.reset(error);
        Ok(())
    }

    /// Asks the peer to stop sending on the receive half
    pub fn request_stop(
        &mut self,
        id: StreamId,
        error: application::Error,
    ) -> Result<(), StreamError> {
        let stream = self.stream_mut(id)?;
        let receive = stream.receive.as_mut().ok_or(StreamError::NonReadable)?;
        receive.request_stop(error);
        self.remove_if_done(id);
        Ok(())
    }

    /// Returns the contiguous bytes that can be read
    pub fn readable(&self, id: StreamId) -> Result<&[u8], StreamError> {
        let stream = self.streams.get(&id).ok_or(StreamError::InvalidStream)?;
        let receive = stream.receive.as_ref().ok_or(StreamError::NonReadable)?;
        if let Some(error) = receive.reset_error() {
            return Err(StreamError::ReceiveReset(error));
        }
        Ok(receive.readable())
    }

    /// Marks `len` readable bytes as read, releasing their credit
    pub fn consume(&mut self, id: StreamId, len: usize) -> Result<usize, StreamError> {
        let stream = self.streams.get_mut(&id).ok_or(StreamError::InvalidStream)?;
        let receive = stream.receive.as_mut().ok_or(StreamError::NonReadable)?;
        if let Some(error) = receive.reset_error() {
            return Err(StreamError::ReceiveReset(error));
        }
        let len = receive.consume(len, &mut self.incoming);
        self.remove_if_done(id);
        Ok(len)
    }

    /// Detaches the application from the stream
    ///
    /// The stream is removed once both halves reach a terminal state.
    pub fn release(&mut self, id: StreamId) -> Result<(), StreamError> {
        self.stream_mut(id)?.release();
        self.remove_if_done(id);
        Ok(())
    }

    // Frame reception

    pub fn on_stream_frame(&mut self, frame: &frame::Stream<&[u8]>) -> Result<(), transport::Error> {
        let id = StreamId::from_varint(frame.stream_id);
        self.open_if_necessary(id, Half::Receive)?;
        ensure!(let Some(stream) = self.streams.get_mut(&id), Ok(()));
        ensure!(let Some(receive) = stream.receive.as_mut(), Ok(()));

        let outcome = receive.on_stream_frame(
            frame.offset.as_u64(),
            frame.data,
            frame.is_fin,
            &mut self.incoming,
        )?;

        if outcome.is_readable {
            self.events.push_back(Event::StreamReadable { id });
        }

        // the frame may have completed a stream the application already released
        self.remove_if_done(id);
        Ok(())
    }

    pub fn on_reset_stream(&mut self, frame: &frame::ResetStream) -> Result<(), transport::Error> {
        let id = StreamId::from_varint(frame.stream_id);
        self.open_if_necessary(id, Half::Receive)?;
        ensure!(let Some(stream) = self.streams.get_mut(&id), Ok(()));
        ensure!(let Some(receive) = stream.receive.as_mut(), Ok(()));

        let error = application::Error::from(frame.application_error_code);
        let outcome = receive.on_reset(error, frame.final_size.as_u64(), &mut self.incoming)?;

        if outcome.is_reset {
            self.events.push_back(Event::StreamReset { id, error });
            self.remove_if_done(id);
        }
        Ok(())
    }

    pub fn on_stop_sending(&mut self, frame: &frame::StopSending) -> Result<(), transport::Error> {
        let id = StreamId::from_varint(frame.stream_id);
        self.open_if_necessary(id, Half::Send)?;
        ensure!(let Some(stream) = self.streams.get_mut(&id), Ok(()));
        ensure!(let Some(send) = stream.send.as_mut(), Ok(()));

        let error = application::Error::from(frame.application_error_code);
        if send.on_stop_sending(error) {
            self.events.push_back(Event::StopSending { id, error });
        }
        Ok(())
    }

    pub fn on_max_stream_data(
        &mut self,
        frame: &frame::MaxStreamData,
    ) -> Result<(), transport::Error> {
        let id = StreamId::from_varint(frame.stream_id);
        self.open_if_necessary(id, Half::Send)?;
        if let Some(send) = self.streams.get_mut(&id).and_then(|s| s.send.as_mut()) {
            send.on_max_stream_data(frame.maximum_stream_data);
        }
        Ok(())
    }

    pub fn on_stream_data_blocked(
        &mut self,
        frame: &frame::StreamDataBlocked,
    ) -> Result<(), transport::Error> {
        let id = StreamId::from_varint(frame.stream_id);
        self.open_if_necessary(id, Half::Receive)?;
        tracing::trace!(stream_id = %id, limit = frame.stream_data_limit.as_u64(), "peer is blocked");
        Ok(())
    }

    #[inline]
    pub fn on_max_data(&mut self, frame: &frame::MaxData) {
        self.outgoing.on_max_update(frame.maximum_data);
    }

    #[inline]
    pub fn on_data_blocked(&mut self, frame: &frame::DataBlocked) {
        tracing::trace!(limit = frame.data_limit.as_u64(), "peer is blocked on connection credit");
    }

    #[inline]
    pub fn on_max_streams(&mut self, frame: &frame::MaxStreams) {
        self.local_limits
            .get_mut(frame.stream_type)
            .on_max_update(frame.maximum_streams);
    }

    #[inline]
    pub fn on_streams_blocked(&mut self, frame: &frame::StreamsBlocked) {
        tracing::trace!(
            stream_type = ?frame.stream_type,
            limit = frame.stream_limit.as_u64(),
            "peer is blocked on stream count"
        );
    }

    // Transmission

    pub fn has_transmission_interest(&self) -> bool {
        let credit = self.outgoing.available();
        self.incoming.has_transmission_interest()
            || self.outgoing.has_transmission_interest()
            || [StreamType::Bidirectional, StreamType::Unidirectional]
                .into_iter()
                .any(|stream_type| {
                    self.local_limits.get(stream_type).has_transmission_interest()
                        || self.remote_limits.get(stream_type).has_transmission_interest()
                })
            || self.streams.values().any(|stream| {
                stream
                    .send
                    .as_ref()
                    .map_or(false, |send| send.has_transmission_interest(credit))
                    || stream
                        .receive
                        .as_ref()
                        .map_or(false, ReceiveStream::has_transmission_interest)
            })
    }

    /// Writes flow control frames first, then stream frames in stream id order
    pub fn on_transmit<W: WriteContext>(&mut self, context: &mut W) {
        self.incoming.on_transmit(context);
        self.outgoing.on_transmit(context);
        for stream_type in [StreamType::Bidirectional, StreamType::Unidirectional] {
            self.remote_limits.get_mut(stream_type).on_transmit(context);
            self.local_limits.get_mut(stream_type).on_transmit(context);
        }

        let mut ids: Vec<StreamId> = self.streams.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            ensure!(context.transmission_constraint().can_transmit());
            let Some(stream) = self.streams.get_mut(&id) else {
                continue;
            };
            if let Some(receive) = stream.receive.as_mut() {
                receive.on_transmit(context);
            }
            if let Some(send) = stream.send.as_mut() {
                send.on_transmit(&mut self.outgoing, context);
            }
        }
    }

    // Delivery notifications

    /// Routes the acknowledgement of a stream related frame
    pub fn on_ack(&mut self, sent: &SentFrame) {
        match *sent {
            SentFrame::MaxData(value) => self.incoming.on_ack(value),
            SentFrame::DataBlocked(value) => self.outgoing.on_blocked_ack(value),
            SentFrame::MaxStreams(stream_type, value) => {
                self.remote_limits.get_mut(stream_type).on_ack(value)
            }
            SentFrame::StreamsBlocked(stream_type, value) => {
                self.local_limits.get_mut(stream_type).on_blocked_ack(value)
            }
            SentFrame::Stream { id, .. }
            | SentFrame::ResetStream(id)
            | SentFrame::StreamDataBlocked(id, _) => {
                ensure!(let Some(stream) = self.streams.get_mut(&id), ());
                if let Some(send) = stream.send.as_mut() {
                    send.on_ack(sent);
                }
                self.remove_if_done(id);
            }
            SentFrame::MaxStreamData(id, _) | SentFrame::StopSending(id) => {
                if let Some(receive) = self.streams.get_mut(&id).and_then(|s| s.receive.as_mut()) {
                    receive.on_ack(sent);
                }
            }
            SentFrame::Ping | SentFrame::HandshakeDone | SentFrame::Crypto { .. } => {}
        }
    }

    /// Routes the loss of a stream related frame
    pub fn on_lost(&mut self, sent: &SentFrame) {
        match *sent {
            SentFrame::MaxData(value) => self.incoming.on_lost(value),
            SentFrame::DataBlocked(value) => self.outgoing.on_blocked_lost(value),
            SentFrame::MaxStreams(stream_type, value) => {
                self.remote_limits.get_mut(stream_type).on_lost(value)
            }
            SentFrame::StreamsBlocked(stream_type, value) => {
                self.local_limits.get_mut(stream_type).on_blocked_lost(value)
            }
            SentFrame::Stream { id, .. }
            | SentFrame::ResetStream(id)
            | SentFrame::StreamDataBlocked(id, _) => {
                if let Some(send) = self.streams.get_mut(&id).and_then(|s| s.send.as_mut()) {
                    send.on_lost(sent);
                }
            }
            SentFrame::MaxStreamData(id, _) | SentFrame::StopSending(id) => {
                if let Some(receive) = self.streams.get_mut(&id).and_then(|s| s.receive.as_mut()) {
                    receive.on_lost(sent);
                }
            }
            SentFrame::Ping | SentFrame::HandshakeDone | SentFrame::Crypto { .. } => {}
        }
    }
}
