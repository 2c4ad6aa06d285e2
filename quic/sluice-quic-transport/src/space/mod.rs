// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet number spaces
//!
//! Initial, Handshake and 1-RTT packets are numbered, acknowledged and
//! recovered independently. Each space is an instance of [`PacketSpace`]
//! holding the same ACK generator, loss recovery manager and CRYPTO stream.

use crate::{ack, path::Path, recovery};
use alloc::boxed::Box;
use sluice_quic_core::{
    ack::Settings as AckSettings, crypto::Keys, packet::PacketNumberSpace,
    recovery::CongestionController, time::Timestamp,
};

mod crypto_stream;

pub use crypto_stream::CryptoStream;

#[derive(Debug)]
pub struct PacketSpace {
    space: PacketNumberSpace,
    pub keys: Keys,
    pub ack_manager: ack::Manager,
    pub recovery_manager: recovery::Manager,
    pub crypto_stream: CryptoStream,
    next_packet_number: u64,
}

impl PacketSpace {
    pub fn new(space: PacketNumberSpace, keys: Keys, ack_settings: AckSettings) -> Self {
        Self {
            space,
            keys,
            ack_manager: ack::Manager::new(space, ack_settings),
            recovery_manager: recovery::Manager::new(space),
            crypto_stream: CryptoStream::default(),
            next_packet_number: 0,
        }
    }

    #[inline]
    pub fn space(&self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub fn next_packet_number(&self) -> u64 {
        self.next_packet_number
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
    //# A QUIC endpoint MUST NOT reuse a packet number within the same packet
    //# number space in one connection.

    /// Called after a packet is transmitted with the given packet number
    #[inline]
    pub fn on_packet_sent(&mut self, packet_number: u64) {
        debug_assert_eq!(packet_number, self.next_packet_number);
        self.next_packet_number = packet_number + 1;
    }

    #[inline]
    pub fn largest_acked(&self) -> Option<u64> {
        self.recovery_manager.largest_acked_packet()
    }

    #[inline]
    pub fn largest_received(&self) -> Option<u64> {
        self.ack_manager.largest_received()
    }

    /// Returns the earliest of the ACK and recovery timers
    #[inline]
    pub fn next_expiration(&self) -> Option<Timestamp> {
        [
            self.ack_manager.next_expiration(),
            self.recovery_manager.next_expiration(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

/// Owns the packet spaces of a connection
///
/// Initial and Handshake spaces are discarded along with their keys; the
/// application space lives until the connection is freed.
#[derive(Debug, Default)]
pub struct PacketSpaceManager {
    initial: Option<Box<PacketSpace>>,
    handshake: Option<Box<PacketSpace>>,
    application: Option<Box<PacketSpace>>,
    /// Set once a space was discarded so it's never installed again
    discarded: [bool; 3],
}

macro_rules! packet_space_api {
    ($get:ident, $get_mut:ident) => {
        #[inline]
        pub fn $get(&self) -> Option<&PacketSpace> {
            self.$get.as_deref()
        }

        #[inline]
        pub fn $get_mut(&mut self) -> Option<&mut PacketSpace> {
            self.$get.as_deref_mut()
        }
    };
}

impl PacketSpaceManager {
    packet_space_api!(initial, initial_mut);

    packet_space_api!(handshake, handshake_mut);

    packet_space_api!(application, application_mut);

    #[inline]
    fn slot(&mut self, space: PacketNumberSpace) -> &mut Option<Box<PacketSpace>> {
        match space {
            PacketNumberSpace::Initial => &mut self.initial,
            PacketNumberSpace::Handshake => &mut self.handshake,
            PacketNumberSpace::ApplicationData => &mut self.application,
        }
    }

    #[inline]
    pub fn get(&self, space: PacketNumberSpace) -> Option<&PacketSpace> {
        match space {
            PacketNumberSpace::Initial => self.initial(),
            PacketNumberSpace::Handshake => self.handshake(),
            PacketNumberSpace::ApplicationData => self.application(),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, space: PacketNumberSpace) -> Option<&mut PacketSpace> {
        self.slot(space).as_deref_mut()
    }

    /// Installs the keys for `space`
    ///
    /// Keys for a discarded space are dropped.
    pub fn install(&mut self, space: PacketNumberSpace, keys: Keys, ack_settings: AckSettings) {
        ensure!(!self.discarded[space.as_index()]);
        let slot = self.slot(space);
        ensure!(slot.is_none());
        tracing::debug!(?space, "keys installed");
        *slot = Some(Box::new(PacketSpace::new(space, keys, ack_settings)));
    }

    #[inline]
    pub fn is_discarded(&self, space: PacketNumberSpace) -> bool {
        self.discarded[space.as_index()]
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#section-4.9
    //# An endpoint MUST discard its Handshake keys when the TLS handshake is
    //# confirmed (Section 4.1.2).

    /// Drops the keys and recovery state of `space`
    pub fn discard<CC: CongestionController>(
        &mut self,
        space: PacketNumberSpace,
        path: &mut Path<CC>,
    ) {
        ensure!(!self.discarded[space.as_index()]);
        self.discarded[space.as_index()] = true;
        if let Some(mut packet_space) = self.slot(space).take() {
            packet_space.recovery_manager.discard(path);
            tracing::debug!(?space, "keys discarded");
        }
    }

    /// Iterates over the installed spaces, from Initial to 1-RTT
    pub fn iter(&self) -> impl Iterator<Item = &PacketSpace> {
        [&self.initial, &self.handshake, &self.application]
            .into_iter()
            .filter_map(|space| space.as_deref())
    }

    /// Returns the earliest timer of any installed space
    pub fn next_expiration(&self) -> Option<Timestamp> {
        self.iter().filter_map(PacketSpace::next_expiration).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_quic_core::{
        crypto::tls::null,
        recovery::{congestion_controller::testing::Unlimited, Settings},
    };

    fn keys() -> Keys {
        Keys::new(null::Key, null::Key)
    }

    #[test]
    fn install_and_discard_test() {
        let mut path = Path::new(Settings::default(), Unlimited::default(), 1200);
        let mut spaces = PacketSpaceManager::default();
        assert_eq!(spaces.iter().count(), 0);

        spaces.install(PacketNumberSpace::Initial, keys(), AckSettings::EARLY);
        spaces.install(PacketNumberSpace::Handshake, keys(), AckSettings::EARLY);
        assert_eq!(spaces.iter().count(), 2);
        assert!(spaces.initial().is_some());

        let initial = spaces.get_mut(PacketNumberSpace::Initial).unwrap();
        assert_eq!(initial.next_packet_number(), 0);
        initial.on_packet_sent(0);
        assert_eq!(initial.next_packet_number(), 1);

        spaces.discard(PacketNumberSpace::Initial, &mut path);
        assert!(spaces.initial().is_none());
        assert!(spaces.is_discarded(PacketNumberSpace::Initial));

        // discarded spaces are never installed again
        spaces.install(PacketNumberSpace::Initial, keys(), AckSettings::EARLY);
        assert!(spaces.initial().is_none());

        let handshake = spaces.handshake().unwrap();
        assert_eq!(handshake.space(), PacketNumberSpace::Handshake);
        assert_eq!(handshake.largest_acked(), None);
        assert_eq!(spaces.next_expiration(), None);
    }
}
