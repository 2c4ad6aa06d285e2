// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Configuration shared by every connection of an endpoint

use sluice_quic_core::{connection::Limits, packet::MIN_INITIAL_DATAGRAM_SIZE, recovery};

pub use sluice_quic_core::endpoint::Type;

/// The datagram size used when none is configured
pub const DEFAULT_MAX_DATAGRAM_SIZE: u16 = 1280;

/// The number of datagrams [`Connection::send`](crate::connection::Connection::send)
/// produces per call by default
pub const DEFAULT_MAX_DATAGRAMS_PER_SEND: usize = 10;

/// Configuration parameters for connections
///
/// The configuration is copied into each connection when it is created, so
/// changing it afterwards only affects new connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    limits: Limits,
    recovery: recovery::Settings,
    max_datagram_size: u16,
    max_datagrams_per_send: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            recovery: recovery::Settings::RECOMMENDED,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            max_datagrams_per_send: DEFAULT_MAX_DATAGRAMS_PER_SEND,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_recovery_settings(mut self, settings: recovery::Settings) -> Self {
        self.recovery = settings;
        self
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-14
    //# QUIC MUST NOT be used if the network path cannot support a
    //# maximum datagram size of at least 1200 bytes.

    /// Sets the size of the datagrams the connection produces
    ///
    /// Values below the smallest size QUIC supports are raised to it.
    #[must_use]
    pub fn with_max_datagram_size(mut self, size: u16) -> Self {
        self.max_datagram_size = size.max(MIN_INITIAL_DATAGRAM_SIZE as u16);
        self
    }

    /// Sets the number of datagrams produced by a single `send` call; at least one
    #[must_use]
    pub fn with_max_datagrams_per_send(mut self, count: usize) -> Self {
        self.max_datagrams_per_send = count.max(1);
        self
    }

    #[inline]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    #[inline]
    pub fn recovery_settings(&self) -> &recovery::Settings {
        &self.recovery
    }

    #[inline]
    pub fn max_datagram_size(&self) -> u16 {
        self.max_datagram_size
    }

    #[inline]
    pub fn max_datagrams_per_send(&self) -> usize {
        self.max_datagrams_per_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn builder_test() {
        let limits = Limits::default()
            .with_max_idle_timeout(Duration::from_secs(5))
            .unwrap();
        let config = Config::default()
            .with_limits(limits)
            .with_max_datagram_size(1000)
            .with_max_datagrams_per_send(0);

        assert_eq!(config.limits().max_idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.max_datagram_size(), 1200);
        assert_eq!(config.max_datagrams_per_send(), 1);
        assert_eq!(config.recovery_settings(), &recovery::Settings::RECOMMENDED);
    }
}
