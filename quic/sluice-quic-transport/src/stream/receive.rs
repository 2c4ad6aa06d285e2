// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::Reassembler,
    flow_control::{IncomingController, MaxDataWriter, MaxStreamDataWriter},
    recovery::SentFrame,
    sync::flag::{StopSending, StopSendingWriter},
    transmission::WriteContext,
};
use sluice_quic_core::{
    application,
    range_set::RangeSet,
    stream::{state, StreamId},
    transport,
    varint::VarInt,
};

/// What a received frame changed on the receive half
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveOutcome {
    /// New contiguous bytes became readable
    pub is_readable: bool,
    /// The frame reset the stream
    pub is_reset: bool,
}

/// The receiving half of a stream
#[derive(Debug)]
pub struct ReceiveStream {
    stream_id: StreamId,
    state: state::Receiver,
    buffer: Reassembler,
    flow_controller: IncomingController<MaxStreamDataWriter>,
    final_size: Option<u64>,
    /// The error code of a RESET_STREAM frame received from the peer
    reset_error: Option<application::Error>,
    stop_sending: Option<StopSending>,
    /// Connection credit given back for bytes that were read or dropped
    connection_released: u64,
}

impl ReceiveStream {
    pub fn new(stream_id: StreamId, window: VarInt) -> Self {
        Self {
            stream_id,
            state: state::Receiver::default(),
            buffer: Reassembler::new(),
            flow_controller: IncomingController::new(window, MaxStreamDataWriter(stream_id)),
            final_size: None,
            reset_error: None,
            stop_sending: None,
            connection_released: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> state::Receiver {
        self.state
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the contiguous bytes the application hasn't consumed
    #[inline]
    pub fn readable(&self) -> &[u8] {
        self.buffer.readable()
    }

    /// Returns the byte ranges received so far
    #[inline]
    pub fn received(&self) -> &RangeSet {
        self.buffer.received()
    }

    #[inline]
    pub fn consumed_offset(&self) -> u64 {
        self.buffer.consumed_offset()
    }

    #[inline]
    pub fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    #[inline]
    pub fn reset_error(&self) -> Option<application::Error> {
        self.reset_error
    }

    /// Returns the credit currently granted to the peer
    #[inline]
    pub fn max_stream_data(&self) -> u64 {
        self.flow_controller.limit()
    }

    /// Returns `true` once the application asked the peer to stop sending
    #[inline]
    pub fn is_stop_requested(&self) -> bool {
        self.stop_sending.is_some()
    }

    /// Returns `true` if every byte up to the final size was received
    #[inline]
    pub fn is_fin_received(&self) -> bool {
        matches!(
            self.state,
            state::Receiver::DataRecvd | state::Receiver::DataRead
        )
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-4.5
    //# Once a final size for a stream is known, it cannot change.  If a
    //# RESET_STREAM or STREAM frame is received indicating a change in the
    //# final size for the stream, an endpoint SHOULD respond with an error
    //# of type FINAL_SIZE_ERROR
    fn validate_final_size(&self, end: u64, is_fin: bool) -> Result<(), transport::Error> {
        let error = transport::Error::FINAL_SIZE_ERROR;
        match self.final_size {
            Some(final_size) => {
                ensure!(
                    end <= final_size,
                    Err(error.with_reason("data beyond the final size"))
                );
                ensure!(
                    !is_fin || end == final_size,
                    Err(error.with_reason("the final size changed"))
                );
            }
            None if is_fin => {
                //= https://www.rfc-editor.org/rfc/rfc9000#section-4.5
                //# An endpoint that receives a RESET_STREAM or STREAM frame
                //# with a final size lower than the highest offset it has
                //# received MUST also respond with a FINAL_SIZE_ERROR error
                ensure!(
                    end >= self.flow_controller.received(),
                    Err(error.with_reason("final size below received data"))
                );
            }
            None => {}
        }
        Ok(())
    }

    /// Accounts for credit up to `end`, on both the stream and the connection
    fn on_receive_offset(
        &mut self,
        end: u64,
        connection_flow_controller: &mut IncomingController<MaxDataWriter>,
    ) -> Result<u64, transport::Error> {
        let increase = end.saturating_sub(self.flow_controller.received());
        self.flow_controller.on_receive(increase)?;
        connection_flow_controller.on_receive(increase)?;
        Ok(increase)
    }

    /// Handles the payload of a STREAM frame
    pub fn on_stream_frame(
        &mut self,
        offset: u64,
        data: &[u8],
        is_fin: bool,
        connection_flow_controller: &mut IncomingController<MaxDataWriter>,
    ) -> Result<ReceiveOutcome, transport::Error> {
        let end = offset + data.len() as u64;
        self.validate_final_size(end, is_fin)?;

        // data after a reset is already accounted for by its final size
        ensure!(!self.state.is_reset(), Ok(ReceiveOutcome::default()));

        let increase = self.on_receive_offset(end, connection_flow_controller)?;

        if is_fin && self.final_size.is_none() {
            self.final_size = Some(end);
            let _ = self.state.on_receive_fin();
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-3.5
        //# If the stream is in the "Recv" or "Size Known" state, the transport
        //# SHOULD signal this by sending a STOP_SENDING frame to prompt closure
        //# of the stream in the opposite direction.
        if self.is_stop_requested() {
            // dropped bytes don't hold on to connection credit
            self.release_connection_credit(increase, connection_flow_controller);
            self.finish_if_stopped();
            return Ok(ReceiveOutcome::default());
        }

        let frontier = self.buffer.frontier();
        self.buffer.write_at(offset, data);
        let is_readable = self.buffer.frontier() > frontier;

        if self.final_size == Some(self.buffer.frontier())
            && self.state.on_receive_all_data().is_ok()
        {
            // the peer won't send anything else
            self.flow_controller.stop_sync();
            tracing::debug!(stream_id = %self.stream_id, "receive half complete");
        }

        Ok(ReceiveOutcome {
            // the end of an empty stream is still news for the application
            is_readable: is_readable || (is_fin && self.is_fin_received()),
            is_reset: false,
        })
    }

    /// Handles a RESET_STREAM frame
    pub fn on_reset(
        &mut self,
        error: application::Error,
        final_size: u64,
        connection_flow_controller: &mut IncomingController<MaxDataWriter>,
    ) -> Result<ReceiveOutcome, transport::Error> {
        self.validate_final_size(final_size, true)?;

        // everything was received already, so the reset changes nothing
        ensure!(
            self.state.on_reset().is_ok(),
            Ok(ReceiveOutcome::default())
        );

        self.on_receive_offset(final_size, connection_flow_controller)?;
        self.final_size = Some(final_size);
        self.reset_error = Some(error);
        self.flow_controller.stop_sync();

        //= https://www.rfc-editor.org/rfc/rfc9000#section-3.5
        //# STOP_SENDING SHOULD only be sent for a stream that has not been
        //# reset by the peer.
        if let Some(stop_sending) = self.stop_sending.as_mut() {
            stop_sending.cancel();
        }

        // buffered bytes are dropped and their credit returns to the connection
        self.buffer.reset(final_size);
        self.release_unread_credit(connection_flow_controller);

        tracing::debug!(
            stream_id = %self.stream_id,
            code = *error.as_varint(),
            final_size,
            "receive half reset"
        );

        Ok(ReceiveOutcome {
            is_readable: false,
            is_reset: true,
        })
    }

    /// Releases `len` readable bytes and returns the number released
    pub fn consume(
        &mut self,
        len: usize,
        connection_flow_controller: &mut IncomingController<MaxDataWriter>,
    ) -> usize {
        let len = self.buffer.consume(len);
        self.flow_controller.release(len as u64);
        self.release_connection_credit(len as u64, connection_flow_controller);

        if self.final_size == Some(self.buffer.consumed_offset()) {
            let _ = self.state.on_app_read_all_data();
        }

        len
    }

    /// Asks the peer to stop sending
    ///
    /// Returns `false` if there is nothing left to stop.
    pub fn request_stop(&mut self, error: application::Error) -> bool {
        ensure!(!self.is_terminal() && self.stop_sending.is_none(), false);

        let mut stop_sending = StopSending::new(StopSendingWriter {
            stream_id: self.stream_id,
            error,
        });
        stop_sending.send();
        self.stop_sending = Some(stop_sending);
        self.flow_controller.stop_sync();

        // the FIN may have arrived already
        self.finish_if_stopped();
        true
    }

    /// Completes a stopped receive half once the final size is known
    ///
    /// Discarded and missing bytes count as received, so the half reaches a
    /// terminal state without waiting for them. Bytes that were readable before
    /// the stop stay readable.
    fn finish_if_stopped(&mut self) {
        ensure!(self.is_stop_requested());
        ensure!(let Some(final_size) = self.final_size, ());
        ensure!(self.state.on_receive_all_data().is_ok());

        // nothing is left for the peer to stop
        if let Some(stop_sending) = self.stop_sending.as_mut() {
            stop_sending.cancel();
        }

        tracing::debug!(stream_id = %self.stream_id, final_size, "stopped receive half complete");
    }

    #[inline]
    fn release_connection_credit(
        &mut self,
        amount: u64,
        connection_flow_controller: &mut IncomingController<MaxDataWriter>,
    ) {
        self.connection_released += amount;
        connection_flow_controller.release(amount);
    }

    /// Gives back the connection credit of every byte that won't be read
    pub fn release_unread_credit(
        &mut self,
        connection_flow_controller: &mut IncomingController<MaxDataWriter>,
    ) {
        let unread = self
            .flow_controller
            .received()
            .saturating_sub(self.connection_released);
        self.release_connection_credit(unread, connection_flow_controller);
    }

    pub fn has_transmission_interest(&self) -> bool {
        self.flow_controller.has_transmission_interest()
            || self
                .stop_sending
                .as_ref()
                .map_or(false, StopSending::has_transmission_interest)
    }

    /// Writes MAX_STREAM_DATA and STOP_SENDING frames
    pub fn on_transmit<W: WriteContext>(&mut self, context: &mut W) {
        if let Some(stop_sending) = self.stop_sending.as_mut() {
            stop_sending.on_transmit(context);
        }
        ensure!(context.transmission_constraint().can_transmit());
        self.flow_controller.on_transmit(context);
    }

    pub fn on_ack(&mut self, sent: &SentFrame) {
        match *sent {
            SentFrame::MaxStreamData(_, value) => self.flow_controller.on_ack(value),
            SentFrame::StopSending(_) => {
                if let Some(stop_sending) = self.stop_sending.as_mut() {
                    stop_sending.on_ack();
                }
            }
            _ => {}
        }
    }

    pub fn on_lost(&mut self, sent: &SentFrame) {
        match *sent {
            SentFrame::MaxStreamData(_, value) => self.flow_controller.on_lost(value),
            SentFrame::StopSending(_) => {
                if let Some(stop_sending) = self.stop_sending.as_mut() {
                    stop_sending.on_lost();
                }
            }
            _ => {}
        }
    }
}
