// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Streams multiplexed over a connection
//!
//! A [`Stream`] owns up to two halves: a [`SendStream`] if the local endpoint may
//! write to it and a [`ReceiveStream`] if the peer may. The [`Manager`] opens,
//! tracks and removes streams and enforces connection level flow control and
//! stream concurrency limits.

use alloc::boxed::Box;
use core::{any::Any, fmt};
use sluice_quic_core::{application, range_set::RangeSet, stream::state};

mod manager;
mod receive;
mod send;

pub use manager::Manager;
pub use receive::{ReceiveOutcome, ReceiveStream};
pub use send::SendStream;
pub use sluice_quic_core::stream::{StreamError, StreamId, StreamType};

#[cfg(test)]
mod tests;

/// The state of a single stream as seen by the application
pub struct Stream {
    id: StreamId,
    pub(crate) send: Option<SendStream>,
    pub(crate) receive: Option<ReceiveStream>,
    /// Set once the application detached from the stream
    is_released: bool,
    app_data: Option<Box<dyn Any + Send>>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("send", &self.send)
            .field("receive", &self.receive)
            .field("is_released", &self.is_released)
            .field("has_app_data", &self.app_data.is_some())
            .finish()
    }
}

impl Stream {
    pub(crate) fn new(
        id: StreamId,
        send: Option<SendStream>,
        receive: Option<ReceiveStream>,
    ) -> Self {
        Self {
            id,
            send,
            receive,
            is_released: false,
            app_data: None,
        }
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    #[inline]
    pub fn send(&self) -> Option<&SendStream> {
        self.send.as_ref()
    }

    #[inline]
    pub fn receive(&self) -> Option<&ReceiveStream> {
        self.receive.as_ref()
    }

    #[inline]
    pub fn send_state(&self) -> Option<state::Sender> {
        self.send.as_ref().map(SendStream::state)
    }

    #[inline]
    pub fn receive_state(&self) -> Option<state::Receiver> {
        self.receive.as_ref().map(ReceiveStream::state)
    }

    /// Returns the byte ranges the peer acknowledged on the send half
    #[inline]
    pub fn acked(&self) -> Option<&RangeSet> {
        self.send.as_ref().map(SendStream::acked)
    }

    /// Returns the code of the RESET_STREAM frame received from the peer
    #[inline]
    pub fn reset_error(&self) -> Option<application::Error> {
        self.receive.as_ref().and_then(ReceiveStream::reset_error)
    }

    /// Returns the code of the STOP_SENDING frame received from the peer
    #[inline]
    pub fn stop_sending_error(&self) -> Option<application::Error> {
        self.send.as_ref().and_then(SendStream::stop_sending_error)
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.is_released
    }

    #[inline]
    pub(crate) fn release(&mut self) {
        self.is_released = true;
    }

    /// Returns the application data attached to the stream
    #[inline]
    pub fn app_data<T: Any + Send>(&self) -> Option<&T> {
        self.app_data.as_ref()?.downcast_ref()
    }

    #[inline]
    pub fn app_data_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.app_data.as_mut()?.downcast_mut()
    }

    /// Attaches `data` to the stream, returning the previous value
    #[inline]
    pub fn set_app_data<T: Any + Send>(&mut self, data: T) -> Option<Box<dyn Any + Send>> {
        self.app_data.replace(Box::new(data))
    }

    #[inline]
    pub fn take_app_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.app_data.take()
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-3
    //# Both the sending and receiving parts of a stream
    //# have to reach a terminal state before the stream can be discarded.

    /// Returns `true` once the application released the stream and neither half
    /// has any work left
    #[inline]
    pub fn is_removable(&self) -> bool {
        self.is_released
            && self.send.as_ref().map_or(true, SendStream::is_terminal)
            && self.receive.as_ref().map_or(true, ReceiveStream::is_terminal)
    }
}
