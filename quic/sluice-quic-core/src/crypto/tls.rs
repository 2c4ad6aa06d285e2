// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The interface between the connection and a handshake implementation

use crate::{crypto::Keys, endpoint, transport};
use bytes::Bytes;
use core::task::Poll;
use sluice_codec::EncoderValue;

pub mod null;

/// Holds all application parameters which are exchanged within the handshake
#[derive(Debug)]
pub struct ApplicationParameters<'a> {
    /// Encoded transport parameters of the peer
    pub transport_parameters: &'a [u8],
}

/// Callbacks the connection exposes to a [`Session`] while it is polled
pub trait Context {
    /// Installs the Handshake level keys
    fn on_handshake_keys(&mut self, keys: Keys) -> Result<(), transport::Error>;

    /// Installs the 1-RTT keys along with the peer's transport parameters
    fn on_one_rtt_keys(
        &mut self,
        keys: Keys,
        application_parameters: ApplicationParameters,
    ) -> Result<(), transport::Error>;

    fn on_handshake_complete(&mut self) -> Result<(), transport::Error>;

    /// Returns in-order CRYPTO bytes received at the Initial level
    fn receive_initial(&mut self, max_len: Option<usize>) -> Option<Bytes>;

    /// Returns in-order CRYPTO bytes received at the Handshake level
    fn receive_handshake(&mut self, max_len: Option<usize>) -> Option<Bytes>;

    fn send_initial(&mut self, transmission: Bytes);

    fn send_handshake(&mut self, transmission: Bytes);
}

/// A factory for handshake sessions
pub trait Endpoint: 'static + Send {
    type Session: Session;

    fn new_server_session<Params: EncoderValue>(&mut self, transport_parameters: &Params)
        -> Self::Session;

    fn new_client_session<Params: EncoderValue>(
        &mut self,
        transport_parameters: &Params,
        server_name: &str,
    ) -> Self::Session;

    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
    //# Initial packets apply the packet protection process, but use a secret
    //# derived from the Destination Connection ID field from the client's
    //# first Initial packet.

    /// Returns the Initial keys for `endpoint_type` derived from the client's first DCID
    fn initial_keys(&self, endpoint_type: endpoint::Type, original_dcid: &[u8]) -> Keys;
}

/// The state of one handshake
pub trait Session: Send {
    /// Consumes any received handshake bytes and makes as much progress as possible
    ///
    /// Returns `Poll::Ready(Ok(()))` once the handshake has completed.
    fn poll<C: Context>(&mut self, context: &mut C) -> Poll<Result<(), transport::Error>>;
}
