// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Credit based flow control
//!
//! The same controllers are used for connection data, stream data and stream counts.
//! Only the frames they write differ, which is captured by the [`ValueWriter`]
//! each controller is instantiated with.

use crate::{
    recovery::SentFrame,
    sync::{ValueSync, ValueWriter},
    transmission::WriteContext,
};
use sluice_quic_core::{
    frame,
    stream::{StreamId, StreamType},
    transport,
    varint::VarInt,
};

#[inline]
fn to_varint(value: u64) -> VarInt {
    VarInt::new(value).unwrap_or(VarInt::MAX)
}

/// Grants credit to the peer and enforces it on received data
#[derive(Debug)]
pub struct IncomingController<W> {
    window: u64,
    /// The total amount of credit the peer used
    received: u64,
    /// The total amount of credit the application gave back
    released: u64,
    limit: ValueSync<W>,
}

impl<W: ValueWriter> IncomingController<W> {
    /// Creates a controller whose initial limit was advertised in the transport parameters
    pub fn new(window: VarInt, writer: W) -> Self {
        Self {
            window: window.as_u64(),
            received: 0,
            released: 0,
            limit: ValueSync::synced(window, writer),
        }
    }

    /// Returns the highest limit advertised to the peer
    #[inline]
    pub fn limit(&self) -> u64 {
        self.limit.latest_value().map_or(0, VarInt::as_u64)
    }

    #[inline]
    pub fn received(&self) -> u64 {
        self.received
    }

    #[inline]
    pub fn released(&self) -> u64 {
        self.released
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        self.limit.has_transmission_interest()
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-4.1
    //# A receiver MUST close the connection with an error of type
    //# FLOW_CONTROL_ERROR if the sender violates the advertised connection or
    //# stream data limits

    /// Accounts for `amount` newly used credit
    #[inline]
    pub fn on_receive(&mut self, amount: u64) -> Result<(), transport::Error> {
        let received = self.received.saturating_add(amount);
        ensure!(
            received <= self.limit(),
            Err(transport::Error::FLOW_CONTROL_ERROR.with_reason("flow control limit exceeded"))
        );
        self.received = received;
        Ok(())
    }

    /// Gives `amount` credit back and queues a limit update once half of the
    /// window can be reopened
    #[inline]
    pub fn release(&mut self, amount: u64) {
        self.released = self.released.saturating_add(amount).min(self.received);
        let new_limit = self.released + self.window;
        if new_limit.saturating_sub(self.limit()) >= self.window / 2 {
            self.limit.update(to_varint(new_limit));
        }
    }

    /// Stops sending limit updates, e.g. once the peer finished sending
    #[inline]
    pub fn stop_sync(&mut self) {
        self.limit.stop_sync();
    }

    #[inline]
    pub fn on_ack(&mut self, value: VarInt) {
        self.limit.on_ack(value);
    }

    #[inline]
    pub fn on_lost(&mut self, value: VarInt) {
        self.limit.on_lost(value);
    }

    #[inline]
    pub fn on_transmit<C: WriteContext>(&mut self, context: &mut C) {
        self.limit.on_transmit(context);
    }
}

/// Tracks the credit granted by the peer
#[derive(Debug)]
pub struct OutgoingController<W> {
    limit: u64,
    sent: u64,
    blocked: ValueSync<W>,
}

impl<W: ValueWriter> OutgoingController<W> {
    pub fn new(limit: VarInt, writer: W) -> Self {
        Self {
            limit: limit.as_u64(),
            sent: 0,
            blocked: ValueSync::new(writer),
        }
    }

    #[inline]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Returns the credit that hasn't been used
    #[inline]
    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.sent)
    }

    #[inline]
    pub fn on_sent(&mut self, amount: u64) {
        debug_assert!(amount <= self.available());
        self.sent += amount;
    }

    /// Raises the limit; limits never decrease
    #[inline]
    pub fn on_max_update(&mut self, limit: VarInt) {
        self.limit = self.limit.max(limit.as_u64());
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-4.1
    //# A sender SHOULD send a
    //# STREAM_DATA_BLOCKED or DATA_BLOCKED frame to indicate to the receiver
    //# that it has data to write but is blocked by flow control limits.

    /// Records that the sender had data but no credit
    ///
    /// A blocked frame is sent once per limit value.
    #[inline]
    pub fn on_blocked(&mut self) {
        if self.available() == 0 {
            self.blocked.update(to_varint(self.limit));
        }
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        self.available() == 0 && self.blocked.has_transmission_interest()
    }

    #[inline]
    pub fn on_blocked_ack(&mut self, value: VarInt) {
        self.blocked.on_ack(value);
    }

    #[inline]
    pub fn on_blocked_lost(&mut self, value: VarInt) {
        self.blocked.on_lost(value);
    }

    #[inline]
    pub fn on_transmit<C: WriteContext>(&mut self, context: &mut C) {
        // the peer raised the limit since the frame was queued
        ensure!(self.available() == 0);
        self.blocked.on_transmit(context);
    }
}

/// Connection level credit as seen by one endpoint
///
/// Once neither endpoint has anything left to send, the send side of one
/// endpoint matches the receive side of the other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataCredit {
    /// The limit the peer granted
    pub send_limit: u64,
    pub sent: u64,
    /// The highest limit granted to the peer
    pub receive_limit: u64,
    pub received: u64,
}

#[derive(Debug, Default)]
pub struct MaxDataWriter;

impl ValueWriter for MaxDataWriter {
    #[inline]
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
        let frame = frame::MaxData {
            maximum_data: value,
        };
        context.write_frame(&frame, SentFrame::MaxData(value))
    }
}

#[derive(Debug, Default)]
pub struct DataBlockedWriter;

impl ValueWriter for DataBlockedWriter {
    #[inline]
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
        let frame = frame::DataBlocked { data_limit: value };
        context.write_frame(&frame, SentFrame::DataBlocked(value))
    }
}

#[derive(Debug)]
pub struct MaxStreamDataWriter(pub StreamId);

impl ValueWriter for MaxStreamDataWriter {
    #[inline]
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
        let frame = frame::MaxStreamData {
            stream_id: self.0.as_varint(),
            maximum_stream_data: value,
        };
        context.write_frame(&frame, SentFrame::MaxStreamData(self.0, value))
    }
}

#[derive(Debug)]
pub struct StreamDataBlockedWriter(pub StreamId);

impl ValueWriter for StreamDataBlockedWriter {
    #[inline]
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
        let frame = frame::StreamDataBlocked {
            stream_id: self.0.as_varint(),
            stream_data_limit: value,
        };
        context.write_frame(&frame, SentFrame::StreamDataBlocked(self.0, value))
    }
}

#[derive(Debug)]
pub struct MaxStreamsWriter(pub StreamType);

impl ValueWriter for MaxStreamsWriter {
    #[inline]
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
        let frame = frame::MaxStreams {
            stream_type: self.0,
            maximum_streams: value,
        };
        context.write_frame(&frame, SentFrame::MaxStreams(self.0, value))
    }
}

#[derive(Debug)]
pub struct StreamsBlockedWriter(pub StreamType);

impl ValueWriter for StreamsBlockedWriter {
    #[inline]
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
        let frame = frame::StreamsBlocked {
            stream_type: self.0,
            stream_limit: value,
        };
        context.write_frame(&frame, SentFrame::StreamsBlocked(self.0, value))
    }
}
