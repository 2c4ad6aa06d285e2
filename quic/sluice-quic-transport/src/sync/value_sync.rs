// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Synchronizes a strictly increasing value towards the remote peer

use crate::transmission::WriteContext;
use sluice_quic_core::varint::VarInt;

/// Serializes a value into an outgoing frame
pub trait ValueWriter {
    fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeliveryState {
    Idle,
    Requested,
    InFlight(VarInt),
}

/// Synchronizes a strictly increasing value towards the remote peer
///
/// Only the latest value is ever transmitted. A newer value supersedes one that
/// is still in flight, so the loss of the older value doesn't trigger a retransmission.
#[derive(Debug)]
pub struct ValueSync<W> {
    latest_value: Option<VarInt>,
    delivery: DeliveryState,
    cancelled: bool,
    writer: W,
}

impl<W: ValueWriter> ValueSync<W> {
    /// Creates a sync with nothing to transmit
    pub fn new(writer: W) -> Self {
        Self {
            latest_value: None,
            delivery: DeliveryState::Idle,
            cancelled: false,
            writer,
        }
    }

    /// Creates a sync for a value the peer already knows about, e.g. from the transport parameters
    pub fn synced(value: VarInt, writer: W) -> Self {
        Self {
            latest_value: Some(value),
            ..Self::new(writer)
        }
    }

    #[inline]
    pub fn latest_value(&self) -> Option<VarInt> {
        self.latest_value
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        matches!(self.delivery, DeliveryState::Requested)
    }

    /// Sets a new value that needs to be synchronized to the peer
    ///
    /// Values that don't exceed the latest one are ignored.
    #[inline]
    pub fn update(&mut self, value: VarInt) {
        ensure!(!self.cancelled);
        ensure!(self.latest_value.map_or(true, |latest| value > latest));
        self.latest_value = Some(value);
        self.delivery = DeliveryState::Requested;
    }

    /// Stops synchronizing the value
    #[inline]
    pub fn stop_sync(&mut self) {
        self.cancelled = true;
        self.delivery = DeliveryState::Idle;
    }

    #[inline]
    pub fn on_ack(&mut self, value: VarInt) {
        if let DeliveryState::InFlight(in_flight) = self.delivery {
            if value >= in_flight {
                self.delivery = DeliveryState::Idle;
            }
        }
    }

    #[inline]
    pub fn on_lost(&mut self, value: VarInt) {
        if self.delivery == DeliveryState::InFlight(value) {
            self.delivery = DeliveryState::Requested;
        }
    }

    /// Queries the component for any outgoing frames that need to get sent
    #[inline]
    pub fn on_transmit<C: WriteContext>(&mut self, context: &mut C) {
        ensure!(self.has_transmission_interest());
        ensure!(context.transmission_constraint().can_transmit());
        ensure!(let Some(value) = self.latest_value, ());

        if self.writer.write_value(value, context) {
            self.delivery = DeliveryState::InFlight(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{recovery::SentFrame, transmission::testing::MockWriteContext};
    use sluice_quic_core::{frame, time::Timestamp};

    #[derive(Debug)]
    struct MaxDataWriter;

    impl ValueWriter for MaxDataWriter {
        fn write_value<C: WriteContext>(&self, value: VarInt, context: &mut C) -> bool {
            context.write_frame(
                &frame::MaxData {
                    maximum_data: value,
                },
                SentFrame::MaxData(value),
            )
        }
    }

    fn transmit(sync: &mut ValueSync<MaxDataWriter>) -> Vec<SentFrame> {
        let mut context = MockWriteContext::new(Timestamp::from_millis(1));
        sync.on_transmit(&mut context);
        context.sent_frames()
    }

    #[test]
    fn supersede_test() {
        let mut sync = ValueSync::synced(VarInt::from_u8(10), MaxDataWriter);
        assert!(transmit(&mut sync).is_empty());

        // smaller or equal values are never sent
        sync.update(VarInt::from_u8(10));
        assert!(!sync.has_transmission_interest());

        sync.update(VarInt::from_u8(20));
        assert_eq!(transmit(&mut sync), [SentFrame::MaxData(VarInt::from_u8(20))]);

        sync.update(VarInt::from_u8(30));
        assert_eq!(transmit(&mut sync), [SentFrame::MaxData(VarInt::from_u8(30))]);

        // losing the superseded value doesn't retransmit
        sync.on_lost(VarInt::from_u8(20));
        assert!(transmit(&mut sync).is_empty());

        sync.on_lost(VarInt::from_u8(30));
        assert_eq!(transmit(&mut sync), [SentFrame::MaxData(VarInt::from_u8(30))]);

        sync.on_ack(VarInt::from_u8(30));
        sync.on_lost(VarInt::from_u8(30));
        assert!(transmit(&mut sync).is_empty());
    }

    #[test]
    fn stop_sync_test() {
        let mut sync = ValueSync::new(MaxDataWriter);
        assert_eq!(sync.latest_value(), None);

        sync.update(VarInt::ZERO);
        assert!(sync.has_transmission_interest());

        sync.stop_sync();
        sync.update(VarInt::from_u8(1));
        assert!(transmit(&mut sync).is_empty());
    }
}
