// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::application;
use core::fmt;

/// Errors returned by stream operations
///
/// None of these fail the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamError {
    /// The stream ID isn't tracked by the connection, either because it was
    /// never opened or because it was already released and removed
    InvalidStream,
    /// The operation needs a send half, but the stream is receive-only
    NonWritable,
    /// The operation needs a receive half, but the stream is send-only
    NonReadable,
    /// A write or shutdown happened after the stream was shut down
    WriteAfterFinish,
    /// The send half was reset, locally or by a peer STOP_SENDING
    SendReset(application::Error),
    /// The peer reset the receive half with RESET_STREAM
    ReceiveReset(application::Error),
    /// The send buffer is full; retry after data is acknowledged
    SendBufferFull,
    /// The peer's stream concurrency limit is reached; retry after MAX_STREAMS
    StreamIdLimit,
    /// The connection is closing or closed
    ConnectionClosed,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStream => write!(f, "the stream is not tracked by the connection"),
            Self::NonWritable => write!(f, "the stream has no send half"),
            Self::NonReadable => write!(f, "the stream has no receive half"),
            Self::WriteAfterFinish => write!(f, "the stream was already shut down"),
            Self::SendReset(code) => write!(f, "the send half was reset with code {}", **code),
            Self::ReceiveReset(code) => write!(f, "the peer reset the stream with code {}", **code),
            Self::SendBufferFull => write!(f, "the send buffer is full"),
            Self::StreamIdLimit => write!(f, "the peer's stream limit is reached"),
            Self::ConnectionClosed => write!(f, "the connection is closed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StreamError {}
