// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sluice_quic_core::{
    crypto::tls::null,
    packet,
    random,
    time::{testing, Clock as _, Duration, Timestamp},
};
use sluice_quic_transport::{
    connection::{self, Error, Event, InternalError, Limits},
    endpoint,
};

pub type Connection = connection::Connection<null::Session>;

/// Every connection ID the engine issues is eight bytes long
pub const CONNECTION_ID_LEN: usize = 8;

/// Upper bound on datagrams moved in one direction per call
const MAX_DATAGRAMS: usize = 256;

/// Installs a log subscriber controlled by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A seeded random source so every run issues the same connection IDs
pub struct Random(ChaCha8Rng);

impl Random {
    pub fn new(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl random::Generator for Random {
    fn public_random_fill(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn private_random_fill(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }
}

/// A configuration that acknowledges every ack-eliciting packet immediately
///
/// This keeps exchanges free of delayed ACK timers unless a test opts in.
pub fn config() -> endpoint::Config {
    config_with(Limits::default())
}

pub fn config_with(limits: Limits) -> endpoint::Config {
    let limits = limits
        .with_ack_elicitation_threshold(1)
        .expect("threshold is valid");
    endpoint::Config::default().with_limits(limits)
}

/// Splits `datagram` into packets and hands them to `to`
///
/// Packets the connection ignores are skipped; any other error is returned.
pub fn deliver(to: &mut Connection, datagram: &[u8], now: Timestamp) -> Result<(), Error> {
    let mut remaining = datagram;
    while !remaining.is_empty() {
        let Ok((packet, rest)) = packet::decode(remaining, CONNECTION_ID_LEN) else {
            break;
        };
        remaining = rest;
        match to.receive(packet, now) {
            Ok(()) | Err(Error::Internal(InternalError::PacketIgnored)) => {}
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

/// Moves every datagram `from` produces to `to`, returning how many were sent
pub fn transmit(from: &mut Connection, to: &mut Connection, now: Timestamp) -> usize {
    transmit_with(from, to, now, |_| false)
}

/// Like [`transmit`], but drops the datagrams for which `drop` returns `true`
pub fn transmit_with(
    from: &mut Connection,
    to: &mut Connection,
    now: Timestamp,
    mut drop: impl FnMut(usize) -> bool,
) -> usize {
    let mut count = 0;
    while count < MAX_DATAGRAMS {
        let Ok(Some(datagram)) = from.poll_transmit(now) else {
            break;
        };
        if !drop(count) {
            let _ = deliver(to, &datagram, now);
        }
        count += 1;
    }
    count
}

pub fn events(connection: &mut Connection) -> Vec<Event> {
    core::iter::from_fn(|| connection.poll_event()).collect()
}

/// A client and a server connected through a lossless, zero-latency network
pub struct Pair {
    pub clock: testing::Clock,
    pub client: Connection,
    pub server: Connection,
}

impl Pair {
    /// Starts a handshake; the server is created from the client's first datagram
    pub fn new(client_config: endpoint::Config, server_config: endpoint::Config) -> Self {
        init_tracing();

        let clock = testing::Clock::default();
        let now = clock.get_time();
        let mut random = Random::new(0x5eed);

        let mut client =
            Connection::connect(client_config, &mut null::Endpoint, "localhost", &mut random, now)
                .expect("client starts");
        let datagram = client
            .poll_transmit(now)
            .expect("client is open")
            .expect("client sends its first flight");
        let (packet, _) =
            packet::decode(&datagram, CONNECTION_ID_LEN).expect("initial packet decodes");
        let server = Connection::accept(
            server_config,
            &mut null::Endpoint,
            packet,
            None,
            &mut random,
            now,
        )
        .expect("server accepts the initial packet");

        Self {
            clock,
            client,
            server,
        }
    }

    /// Creates a pair and runs the handshake to completion
    pub fn connected(client_config: endpoint::Config, server_config: endpoint::Config) -> Self {
        let mut pair = Self::new(client_config, server_config);
        pair.exchange();
        assert_eq!(pair.client.state(), connection::State::Connected);
        assert_eq!(pair.server.state(), connection::State::Connected);
        assert!(pair.client.is_handshake_confirmed());
        assert!(pair.server.is_handshake_confirmed());
        pair
    }

    #[inline]
    pub fn now(&self) -> Timestamp {
        self.clock.get_time()
    }

    pub fn client_to_server(&mut self) -> usize {
        let now = self.now();
        transmit(&mut self.client, &mut self.server, now)
    }

    pub fn server_to_client(&mut self) -> usize {
        let now = self.now();
        transmit(&mut self.server, &mut self.client, now)
    }

    /// Moves datagrams in both directions until neither side has anything to send
    pub fn exchange(&mut self) {
        for _ in 0..64 {
            let sent = self.server_to_client() + self.client_to_server();
            if sent == 0 {
                return;
            }
        }
        panic!("connections kept transmitting");
    }

    /// Returns the earliest timer of either connection
    pub fn next_timeout(&self) -> Option<Timestamp> {
        [self.client.next_timeout(), self.server.next_timeout()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Moves the clock to the next timer and fires it on both connections
    ///
    /// Returns `false` if no timer is armed.
    pub fn advance(&mut self) -> bool {
        let Some(timeout) = self.next_timeout() else {
            return false;
        };
        self.clock.advance_to(timeout);
        let now = self.now();
        self.client.on_timeout(now);
        self.server.on_timeout(now);
        true
    }

    pub fn advance_by(&mut self, duration: Duration) {
        self.clock.inc_by(duration);
        let now = self.now();
        self.client.on_timeout(now);
        self.server.on_timeout(now);
    }
}
