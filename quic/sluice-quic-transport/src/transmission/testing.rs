// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    recovery::SentFrame,
    transmission::{Constraint, WriteContext},
};
use sluice_codec::{DecoderBuffer, EncoderValue};
use sluice_quic_core::{frame::Frame, time::Timestamp};

/// A single frame which had been written
#[derive(Clone, Debug)]
pub struct WrittenFrame {
    pub data: Vec<u8>,
    pub sent: Option<SentFrame>,
}

impl WrittenFrame {
    /// Deserializes the written frame
    ///
    /// Panics if the frame can't be decoded.
    pub fn as_frame(&self) -> Frame<'_> {
        let (frame, remaining) = DecoderBuffer::new(&self.data)
            .decode::<Frame>()
            .expect("buffer contains a valid frame");
        assert!(remaining.is_empty());
        frame
    }
}

/// Collects frames written by components under test
#[derive(Clone, Debug)]
pub struct MockWriteContext {
    pub current_time: Timestamp,
    pub constraint: Constraint,
    pub capacity: usize,
    pub frames: Vec<WrittenFrame>,
}

impl MockWriteContext {
    pub fn new(current_time: Timestamp) -> Self {
        Self {
            current_time,
            constraint: Constraint::None,
            capacity: 1200,
            frames: Vec::new(),
        }
    }

    /// Removes and returns everything written so far
    pub fn take(&mut self) -> Vec<WrittenFrame> {
        core::mem::take(&mut self.frames)
    }

    /// Returns the tracking records of the written frames
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.frames.iter().filter_map(|frame| frame.sent).collect()
    }

    fn write<Frame: EncoderValue>(&mut self, frame: &Frame, sent: Option<SentFrame>) -> bool {
        let len = frame.encoding_size();
        if len > self.capacity {
            return false;
        }
        self.capacity -= len;
        self.frames.push(WrittenFrame {
            data: frame.encode_to_vec(),
            sent,
        });
        true
    }
}

impl WriteContext for MockWriteContext {
    fn current_time(&self) -> Timestamp {
        self.current_time
    }

    fn transmission_constraint(&self) -> Constraint {
        self.constraint
    }

    fn remaining_capacity(&self) -> usize {
        self.capacity
    }

    fn is_ack_eliciting(&self) -> bool {
        self.frames.iter().any(|frame| frame.sent.is_some())
    }

    fn write_frame<Frame: EncoderValue>(&mut self, frame: &Frame, sent: SentFrame) -> bool {
        self.write(frame, Some(sent))
    }

    fn write_untracked_frame<Frame: EncoderValue>(&mut self, frame: &Frame) -> bool {
        self.write(frame, None)
    }
}
