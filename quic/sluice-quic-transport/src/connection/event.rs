// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use sluice_quic_core::{application, connection, stream::StreamId};

/// Something the application should react to
///
/// Events are queued on the connection and drained with
/// [`Connection::poll_event`](super::Connection::poll_event).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed and streams may carry data
    HandshakeComplete,
    /// The peer opened a stream, either explicitly or by using a higher id
    StreamOpened { id: StreamId },
    /// New contiguous bytes, or the end of the stream, can be read
    StreamReadable { id: StreamId },
    /// The peer abandoned its sending half with RESET_STREAM
    StreamReset {
        id: StreamId,
        error: application::Error,
    },
    /// The peer asked the local sending half to stop with STOP_SENDING
    StopSending {
        id: StreamId,
        error: application::Error,
    },
    /// A CONNECTION_CLOSE frame was received from the peer
    ///
    /// Emitted at most once per connection.
    ConnectionClosed { error: connection::Error },
    /// Nothing was received within the idle timeout; the connection can be freed
    IdleTimeout,
}
