// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    connection::Event,
    recovery::SentFrame,
    transmission::testing::MockWriteContext,
};
use sluice_quic_core::{
    application, connection::Limits, endpoint, frame::Frame, stream::state, time::Timestamp,
    transport, varint::VarInt,
};

fn now() -> Timestamp {
    Timestamp::from_millis(1)
}

fn pair(client_limits: Limits, server_limits: Limits) -> (Manager, Manager) {
    let mut client = Manager::new(endpoint::Type::Client, client_limits);
    let mut server = Manager::new(endpoint::Type::Server, server_limits);
    client.on_peer_parameters(&server_limits.transport_parameters(1200));
    server.on_peer_parameters(&client_limits.transport_parameters(1200));
    (client, server)
}

fn deliver(to: &mut Manager, frame: Frame) -> Result<(), transport::Error> {
    match frame {
        Frame::Stream(frame) => to.on_stream_frame(&frame),
        Frame::ResetStream(frame) => to.on_reset_stream(&frame),
        Frame::StopSending(frame) => to.on_stop_sending(&frame),
        Frame::MaxStreamData(frame) => to.on_max_stream_data(&frame),
        Frame::StreamDataBlocked(frame) => to.on_stream_data_blocked(&frame),
        Frame::MaxData(frame) => {
            to.on_max_data(&frame);
            Ok(())
        }
        Frame::DataBlocked(frame) => {
            to.on_data_blocked(&frame);
            Ok(())
        }
        Frame::MaxStreams(frame) => {
            to.on_max_streams(&frame);
            Ok(())
        }
        Frame::StreamsBlocked(frame) => {
            to.on_streams_blocked(&frame);
            Ok(())
        }
        frame => panic!("unexpected frame {frame:?}"),
    }
}

/// Moves every pending frame from `from` to `to` and returns what was sent
fn exchange(from: &mut Manager, to: &mut Manager) -> Vec<SentFrame> {
    let mut context = MockWriteContext::new(now());
    from.on_transmit(&mut context);
    for written in &context.frames {
        deliver(to, written.as_frame()).unwrap();
    }
    context.sent_frames()
}

/// Moves pending frames and acknowledges them right away
fn round_trip(from: &mut Manager, to: &mut Manager) {
    for sent in exchange(from, to) {
        from.on_ack(&sent);
    }
}

fn events(manager: &mut Manager) -> Vec<Event> {
    core::iter::from_fn(|| manager.poll_event()).collect()
}

fn code(value: u32) -> application::Error {
    application::Error::from_u32(value)
}

#[test]
fn open_and_transfer_test() {
    let (mut client, mut server) = pair(Limits::default(), Limits::default());

    let id = client.open(StreamType::Bidirectional).unwrap();
    assert_eq!(id.as_varint(), VarInt::from_u8(0));
    client.write(id, b"hello").unwrap();
    client.shutdown(id).unwrap();

    let sent = exchange(&mut client, &mut server);
    assert_eq!(
        events(&mut server),
        [Event::StreamOpened { id }, Event::StreamReadable { id }]
    );
    assert_eq!(server.readable(id).unwrap(), b"hello");
    assert_eq!(
        server.get(id).unwrap().receive_state(),
        Some(state::Receiver::DataRecvd)
    );
    assert_eq!(client.get(id).unwrap().send_state(), Some(state::Sender::DataSent));

    for sent in sent {
        client.on_ack(&sent);
    }
    let stream = client.get(id).unwrap();
    assert_eq!(stream.send_state(), Some(state::Sender::DataRecvd));
    let acked: Vec<_> = stream.acked().unwrap().iter().collect();
    assert_eq!(acked, [0..5]);

    // writes after the FIN are rejected
    assert_eq!(client.write(id, b"!"), Err(StreamError::WriteAfterFinish));
}

#[test]
fn consume_releases_credit_test() {
    let server_limits = Limits::default()
        .with_bidirectional_remote_data_window(4)
        .unwrap();
    let (mut client, mut server) = pair(Limits::default(), server_limits);

    let id = client.open(StreamType::Bidirectional).unwrap();
    client.write(id, b"hello world").unwrap();
    client.shutdown(id).unwrap();

    round_trip(&mut client, &mut server);
    assert_eq!(server.readable(id).unwrap(), b"hell");

    // the client is blocked on the stream window
    let stream = client.get(id).unwrap();
    assert_eq!(stream.send().unwrap().max_stream_data(), 4);

    assert_eq!(server.consume(id, 3).unwrap(), 3);
    round_trip(&mut server, &mut client);
    assert_eq!(client.get(id).unwrap().send().unwrap().max_stream_data(), 7);

    round_trip(&mut client, &mut server);
    assert_eq!(server.readable(id).unwrap(), b"lo w");
}

#[test]
fn local_stream_limit_test() {
    let server_limits = Limits::default()
        .with_max_open_unidirectional_streams(1)
        .unwrap();
    let (mut client, mut server) = pair(Limits::default(), server_limits);

    let first = client.open(StreamType::Unidirectional).unwrap();
    assert_eq!(first.as_varint(), VarInt::from_u8(2));
    assert_eq!(
        client.open(StreamType::Unidirectional),
        Err(StreamError::StreamIdLimit)
    );

    // the client reports that it is blocked
    let sent = exchange(&mut client, &mut server);
    assert!(sent.contains(&SentFrame::StreamsBlocked(
        StreamType::Unidirectional,
        VarInt::from_u8(1)
    )));

    // a send-only stream with nothing left to do is removed once released
    client.shutdown(first).unwrap();
    round_trip(&mut client, &mut server);
    server.release(first).unwrap();
    assert!(server.get(first).is_none());

    // removing the remote stream raises its limit again
    round_trip(&mut server, &mut client);
    let second = client.open(StreamType::Unidirectional).unwrap();
    assert_eq!(second.as_varint(), VarInt::from_u8(6));
}

#[test]
fn remote_stream_limit_test() {
    let server_limits = Limits::default()
        .with_max_open_bidirectional_streams(2)
        .unwrap();
    let (_client, mut server) = pair(Limits::default(), server_limits);

    let frame = sluice_quic_core::frame::Stream {
        stream_id: VarInt::from_u8(4),
        offset: VarInt::from_u8(0),
        is_last_frame: true,
        is_fin: false,
        data: &b"x"[..],
    };
    server.on_stream_frame(&frame).unwrap();

    // both lower streams of the same type are implicitly opened
    let opened: Vec<_> = events(&mut server)
        .into_iter()
        .filter_map(|event| match event {
            Event::StreamOpened { id } => Some(id.as_varint().as_u64()),
            _ => None,
        })
        .collect();
    assert_eq!(opened, [0, 4]);

    let frame = sluice_quic_core::frame::Stream {
        stream_id: VarInt::from_u8(8),
        ..frame
    };
    let error = server.on_stream_frame(&frame).unwrap_err();
    assert_eq!(error.code, transport::Error::STREAM_LIMIT_ERROR.code);
}

#[test]
fn stream_state_error_test() {
    let (_client, mut server) = pair(Limits::default(), Limits::default());

    let frame = |stream_id: u8| sluice_quic_core::frame::Stream {
        stream_id: VarInt::from_u8(stream_id),
        offset: VarInt::from_u8(0),
        is_last_frame: true,
        is_fin: false,
        data: &b"x"[..],
    };

    // a server initiated unidirectional stream is send-only for the server
    let error = server.on_stream_frame(&frame(3)).unwrap_err();
    assert_eq!(error.code, transport::Error::STREAM_STATE_ERROR.code);

    // the server never opened stream 1
    let error = server.on_stream_frame(&frame(1)).unwrap_err();
    assert_eq!(error.code, transport::Error::STREAM_STATE_ERROR.code);
}

#[test]
fn stop_sending_resets_stream_test() {
    let (mut client, mut server) = pair(Limits::default(), Limits::default());

    let id = client.open(StreamType::Bidirectional).unwrap();
    client.write(id, b"hello").unwrap();
    round_trip(&mut client, &mut server);
    events(&mut server);

    server.request_stop(id, code(12345)).unwrap();
    round_trip(&mut server, &mut client);

    assert_eq!(
        events(&mut client),
        [Event::StopSending {
            id,
            error: code(12345)
        }]
    );
    let stream = client.get(id).unwrap();
    assert_eq!(stream.stop_sending_error(), Some(code(12345)));
    assert_eq!(stream.send_state(), Some(state::Sender::ResetQueued));
    assert_eq!(
        client.write(id, b"more"),
        Err(StreamError::SendReset(code(12345)))
    );

    round_trip(&mut client, &mut server);
    assert_eq!(
        events(&mut server),
        [Event::StreamReset {
            id,
            error: code(12345)
        }]
    );
    assert_eq!(
        server.readable(id),
        Err(StreamError::ReceiveReset(code(12345)))
    );
    assert_eq!(
        client.get(id).unwrap().send_state(),
        Some(state::Sender::ResetRecvd)
    );
}

#[test]
fn reset_returns_connection_credit_test() {
    let server_limits = Limits::default().with_data_window(100).unwrap();
    let (mut client, mut server) = pair(Limits::default(), server_limits);

    let id = client.open(StreamType::Unidirectional).unwrap();
    client.write(id, &[0; 60]).unwrap();
    round_trip(&mut client, &mut server);
    assert_eq!(client.connection_send_credit(), 40);

    client.reset(id, code(1)).unwrap();
    round_trip(&mut client, &mut server);

    // the 60 unread bytes are handed back, reopening more than half the window
    assert_eq!(server.connection_receive_limit(), 160);
    round_trip(&mut server, &mut client);
    assert_eq!(client.connection_send_credit(), 100);
}

#[test]
fn release_and_remove_test() {
    let (mut client, mut server) = pair(Limits::default(), Limits::default());

    let id = client.open(StreamType::Bidirectional).unwrap();
    client.get_mut(id).unwrap().set_app_data(42u32);
    assert_eq!(client.get(id).unwrap().app_data::<u32>(), Some(&42));

    client.write(id, b"ping").unwrap();
    client.shutdown(id).unwrap();
    round_trip(&mut client, &mut server);

    server.write(id, b"pong").unwrap();
    server.shutdown(id).unwrap();
    round_trip(&mut server, &mut client);

    assert_eq!(client.consume(id, 4).unwrap(), 4);
    assert!(client.get(id).is_some(), "the application didn't release the stream");
    client.release(id).unwrap();
    assert!(client.get(id).is_none());
    assert_eq!(client.write(id, b"x"), Err(StreamError::InvalidStream));

    // frames for removed streams are ignored
    let frame = sluice_quic_core::frame::MaxStreamData {
        stream_id: id.as_varint(),
        maximum_stream_data: VarInt::from_u32(1 << 20),
    };
    client.on_max_stream_data(&frame).unwrap();
    assert!(client.is_empty());
}

#[test]
fn reset_after_shutdown_test() {
    let (mut client, mut server) = pair(Limits::default(), Limits::default());

    let id = client.open(StreamType::Bidirectional).unwrap();
    client.write(id, b"hello").unwrap();
    round_trip(&mut client, &mut server);
    assert_eq!(server.consume(id, 5).unwrap(), 5);
    events(&mut server);

    // resetting after the final size was fixed is legal and drops the unsent tail
    client.write(id, b"world").unwrap();
    client.shutdown(id).unwrap();
    client.reset(id, code(12345)).unwrap();
    client.release(id).unwrap();
    round_trip(&mut client, &mut server);

    assert_eq!(
        events(&mut server),
        [Event::StreamReset {
            id,
            error: code(12345)
        }]
    );
    let receive = server.get(id).unwrap().receive().unwrap();
    assert_eq!(receive.final_size(), Some(5));
    assert_eq!(
        client.get(id).unwrap().send_state(),
        Some(state::Sender::ResetRecvd)
    );

    server.shutdown(id).unwrap();
    server.release(id).unwrap();
    round_trip(&mut server, &mut client);

    // the FIN completes the receive half of a stream the client already released
    assert!(client.is_empty());
    assert!(server.is_empty());
}

#[test]
fn stop_then_fin_test() {
    let (mut client, mut server) = pair(Limits::default(), Limits::default());

    let id = client.open(StreamType::Unidirectional).unwrap();
    client.write(id, b"ab").unwrap();
    round_trip(&mut client, &mut server);
    server.request_stop(id, code(7)).unwrap();

    // the peer finishes the stream instead of resetting it
    client.write(id, b"cd").unwrap();
    client.shutdown(id).unwrap();
    round_trip(&mut client, &mut server);

    // the bytes read before the stop are kept, everything after is dropped
    assert_eq!(
        server.get(id).unwrap().receive_state(),
        Some(state::Receiver::DataRecvd)
    );
    assert_eq!(server.readable(id).unwrap(), b"ab");
    assert_eq!(server.data_credit().received, 4);

    // nothing is left to stop
    let sent = exchange(&mut server, &mut client);
    assert!(!sent
        .iter()
        .any(|sent| matches!(sent, SentFrame::StopSending(_))));

    server.release(id).unwrap();
    assert!(server.is_empty());
}

#[test]
fn stop_with_known_final_size_test() {
    let (_client, mut server) = pair(Limits::default(), Limits::default());
    let id = StreamId::from_varint(VarInt::from_u8(2));

    // the end of the stream arrived but its first bytes are missing
    let frame = sluice_quic_core::frame::Stream {
        stream_id: id.as_varint(),
        offset: VarInt::from_u8(2),
        is_last_frame: true,
        is_fin: true,
        data: &b"cd"[..],
    };
    server.on_stream_frame(&frame).unwrap();
    assert_eq!(
        server.get(id).unwrap().receive_state(),
        Some(state::Receiver::SizeKnown)
    );

    server.request_stop(id, code(7)).unwrap();
    assert_eq!(
        server.get(id).unwrap().receive_state(),
        Some(state::Receiver::DataRecvd)
    );
    server.release(id).unwrap();
    assert!(server.is_empty());
}

#[test]
fn flow_control_violation_test() {
    let server_limits = Limits::default().with_data_window(10).unwrap();
    let (_client, mut server) = pair(Limits::default(), server_limits);

    let frame = sluice_quic_core::frame::Stream {
        stream_id: VarInt::from_u8(2),
        offset: VarInt::from_u8(5),
        is_last_frame: true,
        is_fin: false,
        data: &[0u8; 6][..],
    };
    let error = server.on_stream_frame(&frame).unwrap_err();
    assert_eq!(error.code, transport::Error::FLOW_CONTROL_ERROR.code);
}

#[test]
fn final_size_test() {
    let (_client, mut server) = pair(Limits::default(), Limits::default());

    let frame = sluice_quic_core::frame::Stream {
        stream_id: VarInt::from_u8(2),
        offset: VarInt::from_u8(0),
        is_last_frame: true,
        is_fin: true,
        data: &b"abc"[..],
    };
    server.on_stream_frame(&frame).unwrap();
    // retransmissions of the same data are fine
    server.on_stream_frame(&frame).unwrap();

    let longer = sluice_quic_core::frame::Stream {
        data: &b"abcd"[..],
        ..frame
    };
    let error = server.on_stream_frame(&longer).unwrap_err();
    assert_eq!(error.code, transport::Error::FINAL_SIZE_ERROR.code);

    let reset = sluice_quic_core::frame::ResetStream {
        stream_id: VarInt::from_u8(2),
        application_error_code: VarInt::from_u8(1),
        final_size: VarInt::from_u8(2),
    };
    let error = server.on_reset_stream(&reset).unwrap_err();
    assert_eq!(error.code, transport::Error::FINAL_SIZE_ERROR.code);
}

#[test]
fn send_buffer_limit_test() {
    let limits = Limits::default().with_max_send_buffer_size(8).unwrap();
    let (mut client, _server) = pair(limits, Limits::default());

    let id = client.open(StreamType::Unidirectional).unwrap();
    // a single large write is accepted when nothing is buffered
    client.write(id, &[0; 16]).unwrap();
    assert_eq!(client.write(id, b"x"), Err(StreamError::SendBufferFull));
}

#[test]
fn transmit_respects_capacity_test() {
    let (mut client, _server) = pair(Limits::default(), Limits::default());

    let id = client.open(StreamType::Unidirectional).unwrap();
    client.write(id, &[7; 2000]).unwrap();

    let mut context = MockWriteContext::new(now());
    client.on_transmit(&mut context);
    let sent = context.sent_frames();
    assert_eq!(sent.len(), 1);
    match sent[0] {
        SentFrame::Stream { offset, len, is_fin, .. } => {
            assert_eq!(offset, 0);
            assert!(len > 1100 && len < 1200);
            assert!(!is_fin);
        }
        frame => panic!("unexpected frame {frame:?}"),
    }

    // data that was lost is sent again from the same offset
    client.on_lost(&sent[0]);
    let mut context = MockWriteContext::new(now());
    client.on_transmit(&mut context);
    assert!(matches!(
        context.sent_frames()[0],
        SentFrame::Stream { offset: 0, .. }
    ));
}
