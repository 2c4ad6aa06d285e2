// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    recovery::{SentFrame, SentFrames},
    transmission::{Constraint, WriteContext},
};
use sluice_codec::EncoderValue;
use sluice_quic_core::{packet::PacketEncoder, time::Timestamp};

/// A packet being filled with frames
#[derive(Debug)]
pub struct Packet {
    pub encoder: PacketEncoder,
    pub frames: SentFrames,
    pub timestamp: Timestamp,
    pub constraint: Constraint,
    ack_eliciting: bool,
}

impl Packet {
    #[inline]
    pub fn new(encoder: PacketEncoder, timestamp: Timestamp, constraint: Constraint) -> Self {
        Self {
            encoder,
            frames: SentFrames::new(),
            timestamp,
            constraint,
            ack_eliciting: false,
        }
    }

    #[inline]
    pub fn packet_number(&self) -> u64 {
        self.encoder.packet_number()
    }
}

impl WriteContext for Packet {
    #[inline]
    fn current_time(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    fn transmission_constraint(&self) -> Constraint {
        self.constraint
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        self.encoder.remaining_capacity()
    }

    #[inline]
    fn is_ack_eliciting(&self) -> bool {
        self.ack_eliciting
    }

    #[inline]
    fn write_frame<Frame: EncoderValue>(&mut self, frame: &Frame, sent: SentFrame) -> bool {
        ensure!(self.encoder.encode_frame(frame), false);
        self.ack_eliciting |= sent.is_ack_eliciting();
        self.frames.push(sent);
        true
    }

    #[inline]
    fn write_untracked_frame<Frame: EncoderValue>(&mut self, frame: &Frame) -> bool {
        self.encoder.encode_frame(frame)
    }
}
