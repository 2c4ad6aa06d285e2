// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{recovery::SentFrames, transmission::testing::MockWriteContext};
use core::time::Duration;
use sluice_quic_core::{
    range_set::RangeSet,
    recovery::{congestion_controller::testing::Unlimited, NewReno, Settings},
    varint::VarInt,
};

fn t0() -> Timestamp {
    Timestamp::from_millis(1000)
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn unlimited_path() -> Path<Unlimited> {
    Path::new(Settings::default(), Unlimited::default(), 1200)
}

fn packet(packet_number: u64, time_sent: Timestamp) -> SentPacket {
    let mut frames = SentFrames::new();
    frames.push(SentFrame::Crypto {
        offset: packet_number * 100,
        len: 100,
    });
    SentPacket {
        packet_number,
        time_sent,
        sent_bytes: 1200,
        ack_eliciting: true,
        frames,
    }
}

fn ack(packet_numbers: &[u64]) -> RangeSet {
    let mut ranges = RangeSet::new();
    for packet_number in packet_numbers {
        ranges.insert_value(*packet_number);
    }
    ranges
}

fn ack_frame(ranges: &RangeSet) -> Ack<&RangeSet> {
    Ack {
        ack_delay: VarInt::from_u8(0),
        ack_ranges: ranges,
        ecn_counts: None,
    }
}

#[test]
fn ack_updates_rtt_and_cancels_pto_test() {
    let mut path = unlimited_path();
    let mut manager = Manager::new(PacketNumberSpace::Initial);

    manager.on_packet_sent(packet(0, t0()), &mut path, false);
    assert_eq!(path.congestion_controller.bytes_in_flight(), 1200);

    // smoothed_rtt + 4 * rttvar, without max_ack_delay in the Initial space
    assert_eq!(manager.pto_expiration(), Some(t0() + ms(999)));

    let ranges = ack(&[0]);
    let outcome = manager
        .on_ack_frame(&ack_frame(&ranges), t0() + ms(100), &mut path, false)
        .unwrap();

    assert_eq!(outcome.acked.len(), 1);
    assert!(outcome.lost.is_empty());
    assert_eq!(manager.largest_acked_packet(), Some(0));
    assert_eq!(path.rtt_estimator.latest_rtt(), ms(100));
    assert_eq!(path.rtt_estimator.smoothed_rtt(), ms(100));
    assert_eq!(path.congestion_controller.bytes_in_flight(), 0);
    assert_eq!(manager.next_expiration(), None);

    // acknowledging the same packet again resolves nothing
    let outcome = manager
        .on_ack_frame(&ack_frame(&ranges), t0() + ms(200), &mut path, false)
        .unwrap();
    assert!(outcome.is_empty());
}

#[test]
fn ack_of_unsent_packet_test() {
    let mut path = unlimited_path();
    let mut manager = Manager::new(PacketNumberSpace::Handshake);

    let ranges = ack(&[0]);
    let error = manager
        .on_ack_frame(&ack_frame(&ranges), t0(), &mut path, false)
        .unwrap_err();
    assert_eq!(error.code, transport::Error::PROTOCOL_VIOLATION.code);

    manager.on_packet_sent(packet(0, t0()), &mut path, false);
    let ranges = ack(&[0, 5]);
    let error = manager
        .on_ack_frame(&ack_frame(&ranges), t0(), &mut path, false)
        .unwrap_err();
    assert_eq!(error.code, transport::Error::PROTOCOL_VIOLATION.code);
}

#[test]
fn packet_and_time_threshold_test() {
    let mut path = unlimited_path();
    let mut manager = Manager::new(PacketNumberSpace::Initial);

    for packet_number in 0..5 {
        manager.on_packet_sent(packet(packet_number, t0() + ms(packet_number)), &mut path, false);
    }

    let ranges = ack(&[4]);
    let outcome = manager
        .on_ack_frame(&ack_frame(&ranges), t0() + ms(100), &mut path, false)
        .unwrap();

    let acked: Vec<u64> = outcome.acked.iter().map(|p| p.packet_number).collect();
    let lost: Vec<u64> = outcome.lost.iter().map(|p| p.packet_number).collect();
    assert_eq!(acked, [4]);
    // packets 0 and 1 are at least 3 packets behind the largest acknowledged
    assert_eq!(lost, [0, 1]);

    // 9/8 of the 96ms sample after packet 2 was sent
    assert_eq!(manager.loss_expiration(), Some(t0() + ms(2) + ms(108)));
    assert_eq!(manager.pto_expiration(), None);

    // nothing happens before the loss timer expires
    assert!(manager.on_timeout(t0() + ms(105), &mut path, false).is_empty());

    let outcome = manager.on_timeout(t0() + ms(120), &mut path, false);
    let lost: Vec<u64> = outcome.lost.iter().map(|p| p.packet_number).collect();
    assert_eq!(lost, [2, 3]);
    assert!(manager.sent_packets().is_empty());
    assert_eq!(manager.next_expiration(), None);
    assert_eq!(path.congestion_controller.bytes_in_flight(), 0);
}

#[test]
fn pto_requeues_outstanding_frames_test() {
    let mut path = unlimited_path();
    let mut manager = Manager::new(PacketNumberSpace::Initial);

    manager.on_packet_sent(packet(0, t0()), &mut path, false);

    assert!(manager.on_timeout(t0() + ms(998), &mut path, false).is_empty());

    let outcome = manager.on_timeout(t0() + ms(999), &mut path, false);
    assert!(outcome.lost.is_empty());
    assert_eq!(
        outcome.probes,
        [SentFrame::Crypto {
            offset: 0,
            len: 100
        }]
    );
    assert_eq!(path.pto_count, 1);
    // the probed packet is still outstanding
    assert_eq!(manager.sent_packets().len(), 1);
    // the period doubles after a timeout
    assert_eq!(manager.pto_expiration(), Some(t0() + ms(1998)));

    // two probes are owed while packets are in flight
    assert!(manager.requires_probe());
    let mut context = MockWriteContext::new(t0() + ms(999));
    manager.on_transmit(&mut context);
    assert_eq!(context.sent_frames(), [SentFrame::Ping]);
    assert!(manager.requires_probe());

    let mut context = MockWriteContext::new(t0() + ms(999));
    manager.on_transmit(&mut context);
    assert!(!manager.requires_probe());

    // an acknowledgement resets the backoff
    let ranges = ack(&[0]);
    manager
        .on_ack_frame(&ack_frame(&ranges), t0() + ms(1100), &mut path, false)
        .unwrap();
    assert_eq!(path.pto_count, 0);
}

#[test]
fn application_pto_requires_confirmation_test() {
    let mut path = unlimited_path();
    let mut manager = Manager::new(PacketNumberSpace::ApplicationData);

    manager.on_packet_sent(packet(0, t0()), &mut path, false);
    assert_eq!(manager.pto_expiration(), None);

    manager.update_pto_timer(&path, true);
    assert_eq!(manager.pto_expiration(), Some(t0() + ms(999)));
}

#[test]
fn discard_test() {
    let mut path = unlimited_path();
    let mut manager = Manager::new(PacketNumberSpace::Handshake);

    manager.on_packet_sent(packet(0, t0()), &mut path, false);
    manager.on_packet_sent(packet(1, t0()), &mut path, false);
    assert_eq!(path.congestion_controller.bytes_in_flight(), 2400);

    manager.discard(&mut path);
    assert!(manager.sent_packets().is_empty());
    assert_eq!(manager.next_expiration(), None);
    assert_eq!(path.congestion_controller.bytes_in_flight(), 0);
}

#[test]
fn persistent_congestion_test() {
    let mut path = Path::new(Settings::default(), NewReno::new(1200), 1200);
    let mut manager = Manager::new(PacketNumberSpace::ApplicationData);

    manager.on_packet_sent(packet(0, t0()), &mut path, true);
    let ranges = ack(&[0]);
    manager
        .on_ack_frame(&ack_frame(&ranges), t0() + ms(10), &mut path, true)
        .unwrap();

    manager.on_packet_sent(packet(1, t0() + ms(20)), &mut path, true);
    manager.on_packet_sent(packet(2, t0() + ms(200)), &mut path, true);
    manager.on_packet_sent(packet(3, t0() + ms(300)), &mut path, true);
    manager.on_packet_sent(packet(4, t0() + ms(301)), &mut path, true);

    let ranges = ack(&[4]);
    let outcome = manager
        .on_ack_frame(&ack_frame(&ranges), t0() + ms(310), &mut path, true)
        .unwrap();

    let lost: Vec<u64> = outcome.lost.iter().map(|p| p.packet_number).collect();
    assert_eq!(lost, [1, 2]);

    // the lost packets span far more than three probe periods
    assert_eq!(path.congestion_controller.congestion_window(), 2400);
}
