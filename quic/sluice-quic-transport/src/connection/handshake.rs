// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{path::Path, space::PacketSpaceManager, stream};
use bytes::Bytes;
use sluice_quic_core::{
    ack,
    connection::Limits,
    crypto::{tls, Keys},
    packet::PacketNumberSpace,
    recovery::NewReno,
    transport::{self, parameters::TransportParameters},
};

/// Exposes the connection state a [`tls::Session`] may touch while it is polled
pub struct HandshakeContext<'a> {
    pub spaces: &'a mut PacketSpaceManager,
    pub path: &'a mut Path<NewReno>,
    pub streams: &'a mut stream::Manager,
    pub limits: &'a Limits,
    pub peer_parameters: &'a mut Option<TransportParameters>,
    pub is_complete: &'a mut bool,
}

impl<'a> tls::Context for HandshakeContext<'a> {
    fn on_handshake_keys(&mut self, keys: Keys) -> Result<(), transport::Error> {
        self.spaces
            .install(PacketNumberSpace::Handshake, keys, ack::Settings::EARLY);
        Ok(())
    }

    fn on_one_rtt_keys(
        &mut self,
        keys: Keys,
        application_parameters: tls::ApplicationParameters,
    ) -> Result<(), transport::Error> {
        let parameters = TransportParameters::decode(application_parameters.transport_parameters)?;

        self.streams.on_peer_parameters(&parameters);
        self.path.on_peer_ack_settings(ack::Settings {
            max_ack_delay: parameters.max_ack_delay(),
            ack_delay_exponent: parameters.ack_delay_exponent.as_u64() as u8,
            ..self.limits.ack_settings()
        });
        *self.peer_parameters = Some(parameters);

        tracing::debug!(?parameters, "peer transport parameters");

        self.spaces.install(
            PacketNumberSpace::ApplicationData,
            keys,
            self.limits.ack_settings(),
        );
        Ok(())
    }

    fn on_handshake_complete(&mut self) -> Result<(), transport::Error> {
        *self.is_complete = true;
        Ok(())
    }

    fn receive_initial(&mut self, max_len: Option<usize>) -> Option<Bytes> {
        self.spaces
            .initial_mut()?
            .crypto_stream
            .receive(max_len)
    }

    fn receive_handshake(&mut self, max_len: Option<usize>) -> Option<Bytes> {
        self.spaces
            .handshake_mut()?
            .crypto_stream
            .receive(max_len)
    }

    fn send_initial(&mut self, transmission: Bytes) {
        if let Some(space) = self.spaces.initial_mut() {
            space.crypto_stream.send(&transmission);
        }
    }

    fn send_handshake(&mut self, transmission: Bytes) {
        if let Some(space) = self.spaces.handshake_mut() {
            space.crypto_stream.send(&transmission);
        }
    }
}
