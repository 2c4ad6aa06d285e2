// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    frame::Tag,
    range_set::{self, RangeSet},
    varint::VarInt,
};
use core::{
    fmt,
    iter::{Map, Rev},
    ops::{Range, RangeInclusive},
};
use sluice_codec::{
    decoder_parameterized_value, decoder_value, DecoderBuffer, DecoderError, Encoder, EncoderValue,
};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# Receivers send ACK frames (types 0x02 and 0x03) to inform senders of
//# packets they have received and processed.  The ACK frame contains one
//# or more ACK Ranges.

pub const ACK_TAG: u8 = 0x02;
pub const ACK_W_ECN_TAG: u8 = 0x03;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# ACK Frame {
//#   Type (i) = 0x02..0x03,
//#   Largest Acknowledged (i),
//#   ACK Delay (i),
//#   ACK Range Count (i),
//#   First ACK Range (i),
//#   ACK Range (..) ...,
//#   [ECN Counts (..)],
//# }

#[derive(Clone, PartialEq, Eq)]
pub struct Ack<AckRanges> {
    /// The encoded ack delay, scaled by the sender's `ack_delay_exponent`
    pub ack_delay: VarInt,
    pub ack_ranges: AckRanges,
    pub ecn_counts: Option<EcnCounts>,
}

impl<AckRanges> Ack<AckRanges> {
    pub const fn tag(&self) -> u8 {
        if self.ecn_counts.is_some() {
            ACK_W_ECN_TAG
        } else {
            ACK_TAG
        }
    }
}

impl<A: AckRanges> Ack<A> {
    #[inline]
    pub fn ack_ranges(&self) -> A::Iter {
        self.ack_ranges.ack_ranges()
    }

    #[inline]
    pub fn largest_acknowledged(&self) -> VarInt {
        self.ack_ranges.largest_acknowledged()
    }
}

impl<A: fmt::Debug> fmt::Debug for Ack<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Ack")
            .field("ack_delay", &self.ack_delay)
            .field("ack_ranges", &self.ack_ranges)
            .field("ecn_counts", &self.ecn_counts)
            .finish()
    }
}

decoder_parameterized_value!(
    impl<'a> Ack<AckRangesDecoder<'a>> {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let (largest_acknowledged, buffer) = buffer.decode()?;
            let (ack_delay, buffer) = buffer.decode()?;
            let (ack_ranges, buffer) = buffer.decode_parameterized(largest_acknowledged)?;

            let (ecn_counts, buffer) = if tag == ACK_W_ECN_TAG {
                let (ecn_counts, buffer) = buffer.decode()?;
                (Some(ecn_counts), buffer)
            } else {
                (None, buffer)
            };

            let frame = Ack {
                ack_delay,
                ack_ranges,
                ecn_counts,
            };

            Ok((frame, buffer))
        }
    }
);

impl<A: AckRanges> EncoderValue for Ack<A> {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        let mut iter = self.ack_ranges.ack_ranges();

        let Some(first_ack_range) = iter.next() else {
            debug_assert!(false, "at least one ack range is required");
            return;
        };
        let (mut smallest, largest_acknowledged) = first_ack_range.into_inner();
        let first_ack_range = largest_acknowledged - smallest;

        let ack_range_count = VarInt::try_from(iter.len()).unwrap_or(VarInt::MAX);

        buffer.encode(&self.tag());
        buffer.encode(&largest_acknowledged);
        buffer.encode(&self.ack_delay);
        buffer.encode(&ack_range_count);
        buffer.encode(&first_ack_range);

        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
        //# Gap:  A variable-length integer indicating the number of contiguous
        //#    unacknowledged packets preceding the packet number one lower than
        //#    the smallest in the preceding ACK Range.
        //#
        //# ACK Range Length:  A variable-length integer indicating the number of
        //#    contiguous acknowledged packets preceding the largest packet number,
        //#    as determined by the preceding Gap.
        for range in iter {
            let (start, end) = range.into_inner();
            let gap = smallest - end - VarInt::from_u8(2);
            buffer.encode(&gap);
            buffer.encode(&(end - start));
            smallest = start;
        }

        if let Some(ecn_counts) = self.ecn_counts.as_ref() {
            buffer.encode(ecn_counts);
        }
    }
}

/// A set of acknowledged packet numbers, iterated from the largest range down
pub trait AckRanges {
    type Iter: Iterator<Item = RangeInclusive<VarInt>> + ExactSizeIterator;

    fn ack_ranges(&self) -> Self::Iter;

    fn largest_acknowledged(&self) -> VarInt;
}

type RangeSetAckRanges<'a> =
    Map<Rev<range_set::Iter<'a>>, fn(Range<u64>) -> RangeInclusive<VarInt>>;

#[inline]
fn to_inclusive(range: Range<u64>) -> RangeInclusive<VarInt> {
    // packet numbers never exceed the varint range
    let start = VarInt::new(range.start).unwrap_or(VarInt::MAX);
    let end = VarInt::new(range.end - 1).unwrap_or(VarInt::MAX);
    start..=end
}

impl<'a> AckRanges for &'a RangeSet {
    type Iter = RangeSetAckRanges<'a>;

    #[inline]
    fn ack_ranges(&self) -> Self::Iter {
        self.iter()
            .rev()
            .map(to_inclusive as fn(Range<u64>) -> RangeInclusive<VarInt>)
    }

    #[inline]
    fn largest_acknowledged(&self) -> VarInt {
        self.max_value()
            .and_then(|value| VarInt::new(value).ok())
            .unwrap_or_default()
    }
}

/// Lazily decodes the ranges of a received ACK frame
#[derive(Clone, Copy)]
pub struct AckRangesDecoder<'a> {
    largest_acknowledged: VarInt,
    ack_range_count: usize,
    range_buffer: DecoderBuffer<'a>,
}

impl<'a> AckRanges for AckRangesDecoder<'a> {
    type Iter = AckRangesIter<'a>;

    #[inline]
    fn ack_ranges(&self) -> Self::Iter {
        AckRangesIter {
            largest: Some(self.largest_acknowledged),
            smallest: self.largest_acknowledged,
            remaining: self.ack_range_count,
            buffer: self.range_buffer,
        }
    }

    #[inline]
    fn largest_acknowledged(&self) -> VarInt {
        self.largest_acknowledged
    }
}

impl<'a> PartialEq for AckRangesDecoder<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.ack_ranges().eq(other.ack_ranges())
    }
}

impl<'a> Eq for AckRangesDecoder<'a> {}

impl<'a> fmt::Debug for AckRangesDecoder<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.ack_ranges()).finish()
    }
}

const ACK_RANGE_DECODING_ERROR: DecoderError =
    DecoderError::InvariantViolation("invalid ACK ranges");

decoder_parameterized_value!(
    impl<'a> AckRangesDecoder<'a> {
        fn decode(largest_acknowledged: VarInt, buffer: Buffer) -> Result<AckRangesDecoder<'a>> {
            let (ack_range_count, buffer) = buffer.decode::<VarInt>()?;

            // the count excludes the first ack range
            let ack_range_count = usize::try_from(ack_range_count)
                .ok()
                .and_then(|count| count.checked_add(1))
                .ok_or(ACK_RANGE_DECODING_ERROR)?;

            let mut iter = AckRangesIter {
                largest: Some(largest_acknowledged),
                smallest: largest_acknowledged,
                remaining: ack_range_count,
                buffer,
            };

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
            //# If any computed packet number is negative, an endpoint MUST generate a
            //# connection error of type FRAME_ENCODING_ERROR.
            for _ in 0..ack_range_count {
                iter.next().ok_or(ACK_RANGE_DECODING_ERROR)?;
            }

            let consumed = buffer.len() - iter.buffer.len();
            let (range_buffer, remaining) = buffer.decode_slice(consumed)?;

            let ack_ranges = AckRangesDecoder {
                largest_acknowledged,
                ack_range_count,
                range_buffer,
            };

            Ok((ack_ranges, remaining))
        }
    }
);

#[derive(Clone, Copy, Debug)]
pub struct AckRangesIter<'a> {
    largest: Option<VarInt>,
    smallest: VarInt,
    remaining: usize,
    buffer: DecoderBuffer<'a>,
}

impl<'a> AckRangesIter<'a> {
    fn decode_next(&mut self) -> Option<RangeInclusive<VarInt>> {
        let end = match self.largest.take() {
            Some(largest) => largest,
            None => {
                let (gap, buffer) = self.buffer.decode::<VarInt>().ok()?;
                self.buffer = buffer;
                self.smallest
                    .checked_sub(gap)?
                    .checked_sub(VarInt::from_u8(2))?
            }
        };

        let (len, buffer) = self.buffer.decode::<VarInt>().ok()?;
        self.buffer = buffer;
        let start = end.checked_sub(len)?;
        self.smallest = start;

        Some(start..=end)
    }
}

impl<'a> Iterator for AckRangesIter<'a> {
    type Item = RangeInclusive<VarInt>;

    fn next(&mut self) -> Option<Self::Item> {
        ensure!(self.remaining > 0, None);

        let range = self.decode_next();
        if range.is_some() {
            self.remaining -= 1;
        } else {
            self.remaining = 0;
        }
        range
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> ExactSizeIterator for AckRangesIter<'a> {}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.2
//# ECN Counts {
//#   ECT0 Count (i),
//#   ECT1 Count (i),
//#   ECN-CE Count (i),
//# }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EcnCounts {
    pub ect_0_count: VarInt,
    pub ect_1_count: VarInt,
    pub ce_count: VarInt,
}

decoder_value!(
    impl<'a> EcnCounts {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (ect_0_count, buffer) = buffer.decode()?;
            let (ect_1_count, buffer) = buffer.decode()?;
            let (ce_count, buffer) = buffer.decode()?;

            let counts = Self {
                ect_0_count,
                ect_1_count,
                ce_count,
            };

            Ok((counts, buffer))
        }
    }
);

impl EncoderValue for EcnCounts {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.ect_0_count);
        buffer.encode(&self.ect_1_count);
        buffer.encode(&self.ce_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use bolero::check;
    use hex_literal::hex;

    fn decode_ranges(bytes: &[u8]) -> Option<Vec<RangeInclusive<u64>>> {
        let (frame, _) = DecoderBuffer::new(bytes).decode::<Frame>().ok()?;
        let Frame::Ack(ack) = frame else {
            return None;
        };
        Some(
            ack.ack_ranges()
                .map(|range| **range.start()..=**range.end())
                .collect(),
        )
    }

    #[test]
    fn wire_format_test() {
        let mut set = RangeSet::new();
        set.insert(0..3);
        set.insert(5..6);
        set.insert(8..10);

        let frame = Ack {
            ack_delay: VarInt::from_u8(4),
            ack_ranges: &set,
            ecn_counts: None,
        };
        let bytes = frame.encode_to_vec();
        // largest 9, delay 4, 2 more ranges, first range 1, then (gap 1, len 0), (gap 1, len 2)
        assert_eq!(bytes, hex!("02 09 04 02 01 01 00 01 02"));

        assert_eq!(decode_ranges(&bytes), Some(vec![8..=9, 5..=5, 0..=2]));
    }

    #[test]
    fn negative_packet_number_test() {
        // the first range extends below zero
        assert_eq!(decode_ranges(&hex!("02 01 00 00 02")), None);
        // the gap extends below zero
        assert_eq!(decode_ranges(&hex!("02 05 00 01 00 04 00")), None);
    }

    #[test]
    fn ecn_test() {
        let bytes = hex!("03 00 00 00 00 01 02 03");
        let (frame, remaining) = DecoderBuffer::new(&bytes).decode::<Frame>().unwrap();
        assert!(remaining.is_empty());
        let Frame::Ack(ack) = frame else {
            panic!("expected an ack frame");
        };
        assert_eq!(ack.ecn_counts.unwrap().ce_count, VarInt::from_u8(3));
        assert_eq!(ack.encode_to_vec(), bytes);
    }

    #[test]
    fn range_set_round_trip_test() {
        check!()
            .with_type::<Vec<(u8, u8)>>()
            .for_each(|inserts| {
                let mut set = RangeSet::new();
                for (start, len) in inserts {
                    set.insert(*start as u64..(*start as u64 + *len as u64));
                }
                if set.is_empty() {
                    return;
                }

                let frame = Ack {
                    ack_delay: VarInt::ZERO,
                    ack_ranges: &set,
                    ecn_counts: None,
                };
                let bytes = frame.encode_to_vec();

                let expected: Vec<_> = set
                    .iter()
                    .rev()
                    .map(|range| range.start..=range.end - 1)
                    .collect();
                assert_eq!(decode_ranges(&bytes), Some(expected));
            });
    }
}
