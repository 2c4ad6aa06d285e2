// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::buffer::{Chunk, Reassembler, SendBuffer};
use bolero::{check, generator::*};

#[test]
fn gap_replacement_test() {
    let mut buffer = Reassembler::new();

    assert_eq!(buffer.write_at(4, &[4, 5, 6, 7]), 4);
    assert!(buffer.readable().is_empty());

    assert_eq!(buffer.write_at(0, &[0, 1, 2, 3]), 4);
    assert_eq!(buffer.readable(), &[0u8, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(buffer.pending_len(), 0);
}

#[test]
fn gap_overlap_test() {
    let mut buffer = Reassembler::new();

    buffer.write_at(4, &[4, 5, 6, 7]);
    buffer.write_at(2, &[2]);
    assert_eq!(buffer.write_at(1, &[1, 2, 3]), 2);
    assert!(buffer.readable().is_empty());

    buffer.write_at(0, &[0]);
    assert_eq!(buffer.readable(), &[0u8, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn duplicate_test() {
    let mut buffer = Reassembler::new();

    assert_eq!(buffer.write_at(0, b"hello"), 5);
    assert_eq!(buffer.write_at(0, b"hello"), 0);
    assert_eq!(buffer.write_at(2, b"llo"), 0);
    assert_eq!(buffer.readable(), b"hello");

    assert_eq!(buffer.consume(3), 3);
    assert_eq!(buffer.readable(), b"lo");
    assert_eq!(buffer.consumed_offset(), 3);

    // data below the consumed offset is ignored
    assert_eq!(buffer.write_at(0, b"hel"), 0);
    assert_eq!(buffer.readable(), b"lo");
    assert_eq!(buffer.write_at(3, b"lo world"), 6);
    assert_eq!(buffer.readable(), b"lo world");
    assert_eq!(buffer.frontier(), 11);
}

#[test]
fn pop_test() {
    let mut buffer = Reassembler::new();
    assert_eq!(buffer.pop(None), None);

    buffer.write_at(0, b"client hello");
    assert_eq!(&buffer.pop(Some(6)).unwrap()[..], b"client");
    assert_eq!(&buffer.pop(None).unwrap()[..], b" hello");
    assert_eq!(buffer.consumed_offset(), 12);
}

#[test]
fn reset_test() {
    let mut buffer = Reassembler::new();
    buffer.write_at(0, b"hell");
    buffer.write_at(8, b"orld");
    assert_eq!(buffer.max_offset(), 12);

    buffer.reset(12);
    assert!(buffer.readable().is_empty());
    assert_eq!(buffer.pending_len(), 0);
    assert_eq!(buffer.consumed_offset(), 12);
}

#[derive(Clone, Debug, TypeGenerator)]
struct Write {
    #[generator(0..64)]
    offset: u8,
    #[generator(0..16)]
    len: u8,
}

#[test]
fn reassembly_model_test() {
    let stream: Vec<u8> = (0..80u8).collect();

    check!().with_type::<Vec<Write>>().for_each(|writes| {
        let mut buffer = Reassembler::new();
        let mut written = vec![false; stream.len()];

        for write in writes.iter() {
            let start = write.offset as usize;
            let end = start + write.len as usize;
            buffer.write_at(start as u64, &stream[start..end]);
            for slot in &mut written[start..end] {
                *slot = true;
            }
        }

        let contiguous = written.iter().take_while(|written| **written).count();
        assert_eq!(buffer.readable(), &stream[..contiguous]);
        assert_eq!(buffer.frontier(), contiguous as u64);
    });
}

#[test]
fn send_chunks_test() {
    let mut buffer = SendBuffer::new();
    buffer.write(b"hello world");
    assert_eq!(buffer.len(), 11);
    assert!(buffer.has_transmission_interest());

    // new data is limited by the flow control limit
    let chunk = buffer.next_chunk(4, usize::MAX).unwrap();
    assert_eq!(
        chunk,
        Chunk {
            offset: 0,
            data: b"hell",
            is_fin: false
        }
    );
    buffer.on_transmit(chunk.offset, chunk.data.len(), chunk.is_fin);
    assert_eq!(buffer.next_chunk(4, usize::MAX), None);

    buffer.finish();
    let chunk = buffer.next_chunk(u64::MAX, usize::MAX).unwrap();
    assert_eq!(chunk.offset, 4);
    assert_eq!(chunk.data, b"o world");
    assert!(chunk.is_fin);
    buffer.on_transmit(chunk.offset, chunk.data.len(), chunk.is_fin);
    assert!(!buffer.has_transmission_interest());
    assert!(buffer.is_fin_sent());

    // the first chunk is lost and retransmitted regardless of the limit
    buffer.on_lost(0, 4, false);
    let chunk = buffer.next_chunk(0, 2).unwrap();
    assert_eq!(chunk.data, b"he");
    assert!(!chunk.is_fin);

    buffer.on_ack(4, 7, true);
    buffer.on_ack(0, 4, false);
    assert!(buffer.is_fully_acked());
    assert_eq!(buffer.buffered_len(), 0);
    assert_eq!(buffer.acked().iter().collect::<Vec<_>>(), vec![0..11]);
    assert!(!buffer.has_transmission_interest());
}

#[test]
fn acked_ranges_are_not_retransmitted_test() {
    let mut buffer = SendBuffer::new();
    buffer.write(&[0; 100]);
    buffer.on_transmit(0, 100, false);
    buffer.on_ack(20, 30, false);
    buffer.on_lost(0, 100, false);

    let first = buffer.next_chunk(u64::MAX, usize::MAX).unwrap();
    assert_eq!((first.offset, first.end()), (0, 20));
    buffer.on_transmit(first.offset, first.data.len(), false);

    let second = buffer.next_chunk(u64::MAX, usize::MAX).unwrap();
    assert_eq!((second.offset, second.end()), (50, 100));
}

#[test]
fn empty_fin_test() {
    let mut buffer = SendBuffer::new();
    buffer.finish();
    let chunk = buffer.next_chunk(0, 0).unwrap();
    assert_eq!(
        chunk,
        Chunk {
            offset: 0,
            data: &[],
            is_fin: true
        }
    );
    buffer.on_transmit(0, 0, true);
    buffer.on_lost(0, 0, true);
    assert!(buffer.has_transmission_interest());
    buffer.on_ack(0, 0, true);
    assert!(buffer.is_fully_acked());
}

#[test]
fn discard_test() {
    let mut buffer = SendBuffer::new();
    buffer.write(b"hello");
    buffer.on_transmit(0, 5, false);
    buffer.write(b"world");
    buffer.finish();

    buffer.discard();
    assert!(!buffer.has_transmission_interest());
    assert_eq!(buffer.max_sent(), 5);
    assert_eq!(buffer.buffered_len(), 0);
}
