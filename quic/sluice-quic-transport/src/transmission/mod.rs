// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::recovery::SentFrame;
use sluice_codec::EncoderValue;
use sluice_quic_core::time::Timestamp;

mod packet;

pub use packet::Packet;

#[cfg(test)]
pub mod testing;

/// Limits what a component may write into the current packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constraint {
    /// The congestion window is full; only ACK and CONNECTION_CLOSE frames may be sent
    CongestionLimited,
    /// No constraints are in place
    None,
}

impl Constraint {
    /// Returns `true` if ack-eliciting frames may be written
    #[inline]
    pub fn can_transmit(self) -> bool {
        matches!(self, Self::None)
    }
}

/// Context information that is passed to `on_transmit` calls
pub trait WriteContext {
    /// Returns the current point of time
    fn current_time(&self) -> Timestamp;

    /// Returns the transmission constraint for the current packet
    fn transmission_constraint(&self) -> Constraint;

    /// Returns the number of available bytes remaining in the current payload
    fn remaining_capacity(&self) -> usize;

    /// Returns `true` if an ack-eliciting frame was written
    fn is_ack_eliciting(&self) -> bool;

    /// Attempts to write a frame and records `sent` so it is reported back on
    /// acknowledgement or loss
    ///
    /// Returns `false` if the frame didn't fit.
    fn write_frame<Frame: EncoderValue>(&mut self, frame: &Frame, sent: SentFrame) -> bool;

    /// Attempts to write a frame that is never retransmitted, such as ACK
    fn write_untracked_frame<Frame: EncoderValue>(&mut self, frame: &Frame) -> bool;
}
