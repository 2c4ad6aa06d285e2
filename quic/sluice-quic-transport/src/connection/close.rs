// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use sluice_quic_core::{
    connection, frame,
    packet::PacketNumberSpace,
    time::{Timer, Timestamp},
    transport,
    varint::VarInt,
};

/// Tracks the closing and draining periods of a connection
#[derive(Debug, Default)]
pub struct CloseSender {
    state: State,
}

#[derive(Debug, Default)]
enum State {
    /// The connection is open
    #[default]
    Idle,
    /// CONNECTION_CLOSE was initiated locally
    Closing {
        error: connection::Error,
        /// Set when a CONNECTION_CLOSE frame is owed to the peer
        transmission: bool,
        /// Armed once the first CONNECTION_CLOSE frame was sent
        close_timer: Timer,
    },
    /// CONNECTION_CLOSE was received from the peer
    Draining { close_timer: Timer },
    /// The connection can be freed
    Closed,
}

/// The externally visible phase of [`CloseSender`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    Closing,
    Draining,
    Closed,
}

impl CloseSender {
    #[inline]
    pub fn status(&self) -> Status {
        match self.state {
            State::Idle => Status::Idle,
            State::Closing { .. } => Status::Closing,
            State::Draining { .. } => Status::Draining,
            State::Closed => Status::Closed,
        }
    }

    /// Returns the error the connection is being closed with locally
    #[inline]
    pub fn error(&self) -> Option<&connection::Error> {
        match &self.state {
            State::Closing { error, .. } => Some(error),
            _ => None,
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.1
    //# An endpoint enters the closing state after initiating an immediate
    //# close.

    /// Starts the closing period; returns `false` if the connection was already closing
    pub fn close(&mut self, error: connection::Error) -> bool {
        ensure!(matches!(self.state, State::Idle), false);
        self.state = State::Closing {
            error,
            transmission: true,
            close_timer: Timer::default(),
        };
        true
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.2
    //# An endpoint that receives a CONNECTION_CLOSE frame MAY send a single
    //# packet containing a CONNECTION_CLOSE frame before entering the
    //# draining state, using a NO_ERROR code if appropriate.

    /// Enters the draining period after the peer closed the connection
    pub fn drain(&mut self, timeout: Duration, now: Timestamp) {
        ensure!(matches!(self.state, State::Idle | State::Closing { .. }));
        let mut close_timer = Timer::default();
        close_timer.set(now + timeout);
        self.state = State::Draining { close_timer };
    }

    /// Skips the closing period, for example when the idle timer expired
    #[inline]
    pub fn finish(&mut self) {
        self.state = State::Closed;
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.1
    //# An endpoint in the closing state sends a packet containing a
    //# CONNECTION_CLOSE frame in response to any incoming packet that it
    //# attributes to the connection.

    /// Schedules another CONNECTION_CLOSE frame after a packet was received
    #[inline]
    pub fn on_packet_received(&mut self) {
        if let State::Closing { transmission, .. } = &mut self.state {
            *transmission = true;
        }
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        matches!(
            self.state,
            State::Closing {
                transmission: true,
                ..
            }
        )
    }

    /// Called after a datagram carrying CONNECTION_CLOSE frames was produced
    pub fn on_transmit(&mut self, timeout: Duration, now: Timestamp) {
        if let State::Closing {
            transmission,
            close_timer,
            ..
        } = &mut self.state
        {
            *transmission = false;
            close_timer.set_if_unarmed(now + timeout);
        }
    }

    #[inline]
    pub fn next_expiration(&self) -> Option<Timestamp> {
        match &self.state {
            State::Closing { close_timer, .. } | State::Draining { close_timer } => {
                close_timer.expiration()
            }
            _ => None,
        }
    }

    /// Returns `true` if the closing or draining period ended
    pub fn on_timeout(&mut self, now: Timestamp) -> bool {
        let close_timer = match &mut self.state {
            State::Closing { close_timer, .. } | State::Draining { close_timer } => close_timer,
            _ => return false,
        };
        ensure!(close_timer.poll_expiration(now).is_ready(), false);
        self.state = State::Closed;
        true
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.3
//# When sending a CONNECTION_CLOSE frame in an Initial or Handshake
//# packet, an endpoint MUST NOT include information that could reveal
//# application state; a CONNECTION_CLOSE of type 0x1d MUST be
//# replaced by a CONNECTION_CLOSE of type 0x1c with an error code of
//# APPLICATION_ERROR and no reason phrase.

/// Builds the CONNECTION_CLOSE frame announcing `error` in `space`
pub fn close_frame(error: &connection::Error, space: PacketNumberSpace) -> frame::ConnectionClose<'_> {
    match error {
        connection::Error::Transport {
            code,
            frame_type,
            reason,
        } => frame::ConnectionClose {
            error_code: *code,
            frame_type: Some(frame_type.unwrap_or(VarInt::ZERO)),
            reason: reason.as_ref(),
        },
        connection::Error::Application { code, reason } if space.is_application_data() => {
            frame::ConnectionClose {
                error_code: code.as_varint(),
                frame_type: None,
                reason: reason.as_ref(),
            }
        }
        connection::Error::Application { .. } => frame::ConnectionClose {
            error_code: transport::Error::APPLICATION_ERROR.code,
            frame_type: Some(VarInt::ZERO),
            reason: &[],
        },
        // internal conditions are announced as a clean close
        connection::Error::Internal(_) | connection::Error::IdleTimeout => frame::ConnectionClose {
            error_code: transport::Error::NO_ERROR.code,
            frame_type: Some(VarInt::ZERO),
            reason: &[],
        },
    }
}
