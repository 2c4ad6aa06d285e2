// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use alloc::collections::{btree_map, BTreeMap};
use core::ops::RangeInclusive;
use smallvec::SmallVec;
use sluice_quic_core::{
    stream::{StreamId, StreamType},
    time::Timestamp,
    varint::VarInt,
};

/// Describes a frame carried by a sent packet
///
/// The records are reported back when the packet is acknowledged or declared
/// lost, so the owning component can mark the data delivered or queue it again.
/// ACK and CONNECTION_CLOSE frames are never tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentFrame {
    Ping,
    HandshakeDone,
    Crypto {
        offset: u64,
        len: u32,
    },
    Stream {
        id: StreamId,
        offset: u64,
        len: u32,
        is_fin: bool,
    },
    ResetStream(StreamId),
    StopSending(StreamId),
    MaxData(VarInt),
    MaxStreamData(StreamId, VarInt),
    MaxStreams(StreamType, VarInt),
    DataBlocked(VarInt),
    StreamDataBlocked(StreamId, VarInt),
    StreamsBlocked(StreamType, VarInt),
}

impl SentFrame {
    /// Every tracked frame is ack-eliciting
    #[inline]
    pub fn is_ack_eliciting(&self) -> bool {
        true
    }
}

/// The frames of a single packet
///
/// Most packets carry only a handful of frames so they are kept inline.
pub type SentFrames = SmallVec<[SentFrame; 4]>;

//= https://www.rfc-editor.org/rfc/rfc9002#section-A.1.1
//# packet_number:  The packet number of the sent packet.
//#
//# ack_eliciting:  A Boolean that indicates whether a packet is ack-
//#    eliciting.  If true, it is expected that an acknowledgment will be
//#    received, though the peer could delay sending the ACK frame
//#    containing it by up to the max_ack_delay.
//#
//# in_flight:  A Boolean that indicates whether the packet counts toward
//#    bytes in flight.
//#
//# sent_bytes:  The number of bytes sent in the packet, not including UDP
//#    or IP overhead, but including QUIC framing overhead.
//#
//# time_sent:  The time the packet was sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentPacket {
    pub packet_number: u64,
    pub time_sent: Timestamp,
    /// The bytes counted towards bytes in flight; zero if the packet isn't in flight
    pub sent_bytes: u16,
    pub ack_eliciting: bool,
    pub frames: SentFrames,
}

impl SentPacket {
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.sent_bytes > 0
    }
}

/// Packets awaiting acknowledgement, ordered by packet number
#[derive(Clone, Debug, Default)]
pub struct SentPackets {
    packets: BTreeMap<u64, SentPacket>,
}

impl SentPackets {
    #[inline]
    pub fn insert(&mut self, packet: SentPacket) {
        self.packets.insert(packet.packet_number, packet);
    }

    #[inline]
    pub fn get(&self, packet_number: u64) -> Option<&SentPacket> {
        self.packets.get(&packet_number)
    }

    #[inline]
    pub fn remove(&mut self, packet_number: u64) -> Option<SentPacket> {
        self.packets.remove(&packet_number)
    }

    /// Returns the packet numbers in `range` that are still outstanding
    #[inline]
    pub fn packet_numbers_in(&self, range: RangeInclusive<u64>) -> impl Iterator<Item = u64> + '_ {
        self.packets.range(range).map(|(packet_number, _)| *packet_number)
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Values<'_, u64, SentPacket> {
        self.packets.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Removes every packet and returns the bytes they had in flight
    #[inline]
    pub fn clear(&mut self) -> usize {
        let bytes = self.packets.values().map(|packet| packet.sent_bytes as usize).sum();
        self.packets.clear();
        bytes
    }
}
