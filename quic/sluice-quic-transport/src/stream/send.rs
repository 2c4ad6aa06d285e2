// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::SendBuffer,
    flow_control::{DataBlockedWriter, OutgoingController, StreamDataBlockedWriter},
    recovery::SentFrame,
    transmission::WriteContext,
};
use sluice_quic_core::{
    application, frame,
    range_set::RangeSet,
    stream::{state, StreamError, StreamId},
    varint::VarInt,
};

/// Stores all data that needs to get transmitted in outgoing RESET_STREAM frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ResetData {
    final_size: VarInt,
    error: application::Error,
}

/// The sending half of a stream
#[derive(Debug)]
pub struct SendStream {
    stream_id: StreamId,
    state: state::Sender,
    buffer: SendBuffer,
    flow_controller: OutgoingController<StreamDataBlockedWriter>,
    reset: Option<ResetData>,
    /// The error code of a STOP_SENDING frame received from the peer
    stop_sending_error: Option<application::Error>,
    max_buffer_size: u32,
}

impl SendStream {
    pub fn new(stream_id: StreamId, initial_max_stream_data: VarInt, max_buffer_size: u32) -> Self {
        Self {
            stream_id,
            state: state::Sender::default(),
            buffer: SendBuffer::new(),
            flow_controller: OutgoingController::new(
                initial_max_stream_data,
                StreamDataBlockedWriter(stream_id),
            ),
            reset: None,
            stop_sending_error: None,
            max_buffer_size,
        }
    }

    #[inline]
    pub fn state(&self) -> state::Sender {
        self.state
    }

    /// Returns the byte ranges the peer acknowledged
    #[inline]
    pub fn acked(&self) -> &RangeSet {
        self.buffer.acked()
    }

    #[inline]
    pub fn stop_sending_error(&self) -> Option<application::Error> {
        self.stop_sending_error
    }

    /// Returns the error the send half was reset with
    #[inline]
    pub fn reset_error(&self) -> Option<application::Error> {
        self.reset.map(|reset| reset.error)
    }

    /// Returns the credit granted by the peer through MAX_STREAM_DATA
    #[inline]
    pub fn max_stream_data(&self) -> u64 {
        self.flow_controller.limit()
    }

    /// Returns the number of bytes written by the application
    #[inline]
    pub fn len(&self) -> u64 {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    #[inline]
    fn ensure_writable(&self) -> Result<(), StreamError> {
        if let Some(reset) = self.reset {
            return Err(StreamError::SendReset(reset.error));
        }
        ensure!(!self.buffer.is_finished(), Err(StreamError::WriteAfterFinish));
        Ok(())
    }

    /// Appends `bytes` to the stream
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.ensure_writable()?;

        // a single write larger than the buffer is still accepted when nothing is buffered
        let buffered = self.buffer.buffered_len();
        ensure!(
            buffered == 0 || buffered + bytes.len() <= self.max_buffer_size as usize,
            Err(StreamError::SendBufferFull)
        );

        self.buffer.write(bytes);
        Ok(())
    }

    /// Fixes the final size of the stream at everything written so far
    pub fn shutdown(&mut self) -> Result<(), StreamError> {
        self.ensure_writable()?;
        self.buffer.finish();
        Ok(())
    }

    /// Abandons the stream, queueing a RESET_STREAM frame
    ///
    /// Returns `false` if the stream was already reset or fully acknowledged.
    pub fn reset(&mut self, error: application::Error) -> bool {
        ensure!(self.reset.is_none(), false);
        ensure!(self.state.on_queue_reset().is_ok(), false);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-4.5
        //# If a RESET_STREAM or STREAM frame is received indicating a change
        //# in the final size for the stream, an endpoint SHOULD respond with
        //# an error of type FINAL_SIZE_ERROR
        let final_size = match self.buffer.final_size() {
            Some(final_size) if self.buffer.is_fin_sent() => final_size,
            _ => self.buffer.max_sent(),
        };

        self.reset = Some(ResetData {
            final_size: VarInt::new(final_size).unwrap_or(VarInt::MAX),
            error,
        });
        self.buffer.discard();

        tracing::debug!(stream_id = %self.stream_id, code = *error.as_varint(), final_size, "send half reset");
        true
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-3.5
    //# An endpoint that receives a STOP_SENDING frame
    //# MUST send a RESET_STREAM frame if the stream is in the "Ready" or
    //# "Send" state.

    /// Handles a STOP_SENDING frame; returns `true` the first time it is seen
    pub fn on_stop_sending(&mut self, error: application::Error) -> bool {
        ensure!(self.stop_sending_error.is_none(), false);
        self.stop_sending_error = Some(error);
        self.reset(error);
        true
    }

    #[inline]
    pub fn on_max_stream_data(&mut self, maximum_stream_data: VarInt) {
        self.flow_controller.on_max_update(maximum_stream_data);
    }

    /// Returns `true` if the stream has frames to send given the connection credit
    pub fn has_transmission_interest(&self, connection_credit: u64) -> bool {
        match self.state {
            state::Sender::ResetQueued => true,
            _ if self.reset.is_some() => false,
            _ => {
                self.flow_controller.has_transmission_interest()
                    || self
                        .buffer
                        .next_chunk(self.new_data_limit(connection_credit), usize::MAX)
                        .is_some()
            }
        }
    }

    /// The highest offset new data may reach
    #[inline]
    fn new_data_limit(&self, connection_credit: u64) -> u64 {
        self.flow_controller
            .limit()
            .min(self.buffer.max_sent().saturating_add(connection_credit))
    }

    /// Writes RESET_STREAM, STREAM and STREAM_DATA_BLOCKED frames
    pub fn on_transmit<W: WriteContext>(
        &mut self,
        connection_flow_controller: &mut OutgoingController<DataBlockedWriter>,
        context: &mut W,
    ) {
        ensure!(context.transmission_constraint().can_transmit());

        if let Some(reset) = self.reset {
            ensure!(self.state.is_reset_queued());
            let frame = frame::ResetStream {
                stream_id: self.stream_id.as_varint(),
                application_error_code: reset.error.as_varint(),
                final_size: reset.final_size,
            };
            if context.write_frame(&frame, SentFrame::ResetStream(self.stream_id)) {
                let _ = self.state.on_send_reset();
            }
            return;
        }

        self.flow_controller.on_transmit(context);

        loop {
            let new_data_limit = self.new_data_limit(connection_flow_controller.available());
            let Some(chunk) = self.buffer.next_chunk(new_data_limit, usize::MAX) else {
                break;
            };

            let Ok(offset) = VarInt::new(chunk.offset) else {
                break;
            };
            let max_len = frame::Stream::<&[u8]>::max_data_len(
                context.remaining_capacity(),
                self.stream_id.as_varint(),
                offset,
            );
            ensure!(max_len > 0 || chunk.data.is_empty());

            let chunk_len = chunk.data.len();
            let len = chunk_len.min(max_len);
            let is_fin = chunk.is_fin && len == chunk_len;
            let frame = frame::Stream {
                stream_id: self.stream_id.as_varint(),
                offset,
                is_last_frame: false,
                is_fin,
                data: &chunk.data[..len],
            };
            let sent = SentFrame::Stream {
                id: self.stream_id,
                offset: chunk.offset,
                len: len as u32,
                is_fin,
            };

            if !context.write_frame(&frame, sent) {
                break;
            }

            let chunk_offset = chunk.offset;
            let new_bytes = (chunk_offset + len as u64).saturating_sub(self.buffer.max_sent());
            self.flow_controller.on_sent(new_bytes);
            connection_flow_controller.on_sent(new_bytes);
            self.buffer.on_transmit(chunk_offset, len, is_fin);

            let _ = self.state.on_send_stream();
            if is_fin {
                let _ = self.state.on_send_fin();
            }

            if !is_fin && len < chunk_len {
                // the packet is full
                return;
            }
        }

        // data is waiting but no credit is left
        if self.buffer.has_transmission_interest() && !self.buffer.is_fin_sent() {
            if self.flow_controller.available() == 0 {
                self.flow_controller.on_blocked();
                self.flow_controller.on_transmit(context);
            }
            if connection_flow_controller.available() == 0 {
                connection_flow_controller.on_blocked();
            }
        }
    }

    /// This method gets called when a packet carrying a frame of this stream got acknowledged
    pub fn on_ack(&mut self, sent: &SentFrame) {
        match *sent {
            SentFrame::Stream {
                offset, len, is_fin, ..
            } => {
                ensure!(self.reset.is_none());
                self.buffer.on_ack(offset, len as usize, is_fin);

                //= https://www.rfc-editor.org/rfc/rfc9000#section-3.1
                //# Once all stream data has been successfully acknowledged, the
                //# sending part of the stream enters the "Data Recvd" state, which is
                //# a terminal state.
                if self.buffer.is_fully_acked() && self.state.on_recv_all_acks().is_ok() {
                    tracing::debug!(stream_id = %self.stream_id, "send half acknowledged");
                }
            }
            SentFrame::ResetStream(_) => {
                let _ = self.state.on_recv_reset_ack();
            }
            SentFrame::StreamDataBlocked(_, value) => {
                self.flow_controller.on_blocked_ack(value);
            }
            _ => {}
        }
    }

    /// This method gets called when a packet carrying a frame of this stream was declared lost
    pub fn on_lost(&mut self, sent: &SentFrame) {
        match *sent {
            SentFrame::Stream {
                offset, len, is_fin, ..
            } => {
                // reset streams never retransmit data
                ensure!(self.reset.is_none());
                self.buffer.on_lost(offset, len as usize, is_fin);
            }
            SentFrame::ResetStream(_) => {
                let _ = self.state.on_reset_lost();
            }
            SentFrame::StreamDataBlocked(_, value) => {
                self.flow_controller.on_blocked_lost(value);
            }
            _ => {}
        }
    }
}
