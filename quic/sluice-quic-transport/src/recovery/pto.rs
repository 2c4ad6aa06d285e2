// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{recovery::SentFrame, transmission::WriteContext};
use core::time::Duration;
use sluice_quic_core::{
    frame,
    time::{Timer, Timestamp},
};

/// Manages the probe timeout and the probe packets it triggers
#[derive(Debug, Default)]
pub(crate) struct Pto {
    timer: Timer,
    state: State,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    Idle,
    RequiresTransmission(u8),
}

impl Pto {
    #[inline]
    pub fn expiration(&self) -> Option<Timestamp> {
        self.timer.expiration()
    }

    /// Returns `true` if the timer expired and probes were queued
    pub fn on_timeout(&mut self, packets_in_flight: bool, now: Timestamp) -> bool {
        if self.timer.poll_expiration(now).is_pending() {
            return false;
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
        //# When a PTO timer expires, a sender MUST send at least one ack-
        //# eliciting packet in the packet number space as a probe.

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
        //# An endpoint MAY send up to two full-sized datagrams containing
        //# ack-eliciting packets to avoid an expensive consecutive PTO
        //# expiration due to a single lost datagram or to transmit data from
        //# multiple packet number spaces.
        let transmission_count = if packets_in_flight { 2 } else { 1 };
        self.state = State::RequiresTransmission(transmission_count);
        true
    }

    #[inline]
    pub fn requires_transmission(&self) -> bool {
        matches!(self.state, State::RequiresTransmission(_))
    }

    /// Completes a probe packet, adding a PING if nothing ack-eliciting was written
    pub fn on_transmit<W: WriteContext>(&mut self, context: &mut W) {
        let State::RequiresTransmission(remaining) = self.state else {
            return;
        };

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
        //# All probe packets sent on a PTO MUST be ack-eliciting.
        if context.is_ack_eliciting() || context.write_frame(&frame::Ping, SentFrame::Ping) {
            let remaining = remaining - 1;
            self.state = if remaining == 0 {
                State::Idle
            } else {
                State::RequiresTransmission(remaining)
            };
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
    //# A sender SHOULD restart its PTO timer every time an ack-eliciting
    //# packet is sent or acknowledged, or when Initial or Handshake keys are
    //# discarded (Section 4.9 of [QUIC-TLS]).
    #[inline]
    pub fn update(&mut self, base_timestamp: Timestamp, pto_period: Duration) {
        self.timer.set(base_timestamp + pto_period);
    }

    #[inline]
    pub fn cancel(&mut self) {
        self.timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmission::testing::MockWriteContext;

    #[test]
    fn probe_test() {
        let now = Timestamp::from_millis(100);
        let mut pto = Pto::default();

        pto.update(now, Duration::from_millis(10));
        assert!(!pto.on_timeout(true, now));
        assert!(pto.on_timeout(true, now + Duration::from_millis(10)));
        assert!(pto.expiration().is_none());

        // an empty probe gets a PING
        let mut context = MockWriteContext::new(now);
        pto.on_transmit(&mut context);
        assert_eq!(context.sent_frames(), [SentFrame::Ping]);
        assert!(pto.requires_transmission());

        // a probe that already carries data is left alone
        let mut context = MockWriteContext::new(now);
        context.write_frame(&frame::HandshakeDone, SentFrame::HandshakeDone);
        pto.on_transmit(&mut context);
        assert_eq!(context.sent_frames(), [SentFrame::HandshakeDone]);
        assert!(!pto.requires_transmission());
    }

    #[test]
    fn single_probe_without_packets_in_flight_test() {
        let now = Timestamp::from_millis(100);
        let mut pto = Pto::default();
        pto.update(now, Duration::ZERO);
        assert!(pto.on_timeout(false, now));

        let mut context = MockWriteContext::new(now);
        pto.on_transmit(&mut context);
        assert!(!pto.requires_transmission());
    }
}
