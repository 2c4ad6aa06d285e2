// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sends a "flag" frame towards the peer
//!
//! This is used by frames that are sent once and retransmitted on loss until
//! the peer acknowledges them, like HANDSHAKE_DONE and STOP_SENDING.

use crate::{recovery::SentFrame, transmission::WriteContext};
use sluice_quic_core::{application, frame, stream::StreamId};

#[derive(Debug, Default)]
pub struct Flag<W: Writer> {
    delivery: DeliveryState,
    writer: W,
}

pub trait Writer {
    fn write_frame<C: WriteContext>(&self, context: &mut C) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum DeliveryState {
    /// The flag has not been requested
    #[default]
    Idle,

    /// The flag needs to be transmitted
    Requested,

    /// The flag has been transmitted and is pending acknowledgement
    InFlight,

    /// The flag has been delivered
    Delivered,
}

impl<W: Writer> Flag<W> {
    /// Constructs a flag with the given `writer`
    pub fn new(writer: W) -> Self {
        Self {
            delivery: DeliveryState::Idle,
            writer,
        }
    }

    #[inline]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Returns `true` if the flag hasn't been sent
    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.delivery, DeliveryState::Idle)
    }

    /// Returns `true` if the flag has been delivered
    #[inline]
    pub fn is_delivered(&self) -> bool {
        matches!(self.delivery, DeliveryState::Delivered)
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        matches!(self.delivery, DeliveryState::Requested)
    }

    /// Starts sending the flag to the peer
    #[inline]
    pub fn send(&mut self) {
        if self.is_idle() {
            self.delivery = DeliveryState::Requested;
        }
    }

    /// Stops sending the flag without it being delivered
    #[inline]
    pub fn cancel(&mut self) {
        if !self.is_delivered() {
            self.delivery = DeliveryState::Idle;
        }
    }

    /// This method gets called when a packet carrying the flag got acknowledged
    #[inline]
    pub fn on_ack(&mut self) {
        if matches!(self.delivery, DeliveryState::InFlight) {
            self.delivery = DeliveryState::Delivered;
        }
    }

    /// This method gets called when a packet carrying the flag was declared lost
    #[inline]
    pub fn on_lost(&mut self) {
        if matches!(self.delivery, DeliveryState::InFlight) {
            self.delivery = DeliveryState::Requested;
        }
    }

    /// Queries the component for any outgoing frames that need to get sent
    #[inline]
    pub fn on_transmit<C: WriteContext>(&mut self, context: &mut C) {
        ensure!(self.has_transmission_interest());
        ensure!(context.transmission_constraint().can_transmit());

        if self.writer.write_frame(context) {
            self.delivery = DeliveryState::InFlight;
        }
    }
}

pub type HandshakeDone = Flag<HandshakeDoneWriter>;

#[derive(Debug, Default)]
pub struct HandshakeDoneWriter;

impl Writer for HandshakeDoneWriter {
    #[inline]
    fn write_frame<C: WriteContext>(&self, context: &mut C) -> bool {
        context.write_frame(&frame::HandshakeDone, SentFrame::HandshakeDone)
    }
}

pub type StopSending = Flag<StopSendingWriter>;

#[derive(Debug)]
pub struct StopSendingWriter {
    pub stream_id: StreamId,
    pub error: application::Error,
}

impl Writer for StopSendingWriter {
    #[inline]
    fn write_frame<C: WriteContext>(&self, context: &mut C) -> bool {
        let frame = frame::StopSending {
            stream_id: self.stream_id.as_varint(),
            application_error_code: self.error.as_varint(),
        };
        context.write_frame(&frame, SentFrame::StopSending(self.stream_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmission::{testing::MockWriteContext, Constraint};
    use sluice_quic_core::{frame::Frame, time::Timestamp};

    #[test]
    fn handshake_done_test() {
        let mut context = MockWriteContext::new(Timestamp::from_millis(1));
        let mut flag = HandshakeDone::default();

        assert!(flag.is_idle());
        flag.on_transmit(&mut context);
        assert!(context.frames.is_empty(), "idle flags should not transmit");

        flag.send();
        flag.send();
        assert!(flag.has_transmission_interest());

        context.constraint = Constraint::CongestionLimited;
        flag.on_transmit(&mut context);
        assert!(context.frames.is_empty(), "flags respect the congestion window");

        context.constraint = Constraint::None;
        flag.on_transmit(&mut context);
        let frames = context.take();
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0].as_frame(), Frame::HandshakeDone(_)));
        assert_eq!(frames[0].sent, Some(SentFrame::HandshakeDone));

        // nothing else is written while in flight
        flag.on_transmit(&mut context);
        assert!(context.frames.is_empty());

        flag.on_lost();
        assert!(flag.has_transmission_interest());
        flag.on_transmit(&mut context);
        assert_eq!(context.take().len(), 1);

        flag.on_ack();
        assert!(flag.is_delivered());

        // late losses don't revive delivered flags
        flag.on_lost();
        flag.send();
        assert!(flag.is_delivered());
    }

    #[test]
    fn stop_sending_test() {
        let mut context = MockWriteContext::new(Timestamp::from_millis(1));
        let stream_id = StreamId::from_varint(sluice_quic_core::varint::VarInt::from_u8(4));
        let mut flag = StopSending::new(StopSendingWriter {
            stream_id,
            error: application::Error::from_u32(54321),
        });

        flag.send();
        flag.on_transmit(&mut context);
        let frames = context.take();
        match frames[0].as_frame() {
            Frame::StopSending(frame) => {
                assert_eq!(frame.stream_id, stream_id.as_varint());
                assert_eq!(frame.application_error_code.as_u64(), 54321);
            }
            frame => panic!("unexpected frame {frame:?}"),
        }

        flag.cancel();
        assert!(flag.is_idle());
    }
}
