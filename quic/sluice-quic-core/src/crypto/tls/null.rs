// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Minimal handshake that doesn't perform any key exchange or encryption
//!
//! NOTE: this should only be used for testing
//!
//! The handshake is reduced to exchanging transport parameters, while keeping
//! the message flight shape of TLS 1.3 so the connection exercises every
//! encryption level:
//!
//! ```text
//! client                                      server
//!   Initial[ClientHello(params)]        ---->
//!                                       <----  Initial[ServerHello]
//!                                       <----  Handshake[EncryptedExtensions(params), Finished]
//!   Handshake[Finished]                 ---->
//! ```
//!
//! Every message is framed as `type (u8) | length (u16) | body`. Packets are
//! "sealed" with a tag holding the packet number and a checksum of the
//! header and payload, which lets the receiver reject corrupted or misnumbered
//! packets without any real cryptography.

use crate::{
    crypto::{self, tls, CryptoError, HeaderProtectionMask, Keys},
    endpoint, transport,
};
use bytes::{Bytes, BytesMut};
use core::task::Poll;
use sluice_codec::{DecoderBuffer, EncoderValue};

const CLIENT_HELLO: u8 = 1;
const SERVER_HELLO: u8 = 2;
const ENCRYPTED_EXTENSIONS: u8 = 8;
const FINISHED: u8 = 20;

const MESSAGE_HEADER_LEN: usize = 3;

#[derive(Debug, Default)]
pub struct Endpoint;

impl tls::Endpoint for Endpoint {
    type Session = Session;

    #[inline]
    fn new_server_session<Params: EncoderValue>(&mut self, transport_parameters: &Params) -> Session {
        Session::new(endpoint::Type::Server, transport_parameters)
    }

    #[inline]
    fn new_client_session<Params: EncoderValue>(
        &mut self,
        transport_parameters: &Params,
        _server_name: &str,
    ) -> Session {
        Session::new(endpoint::Type::Client, transport_parameters)
    }

    #[inline]
    fn initial_keys(&self, _endpoint_type: endpoint::Type, _original_dcid: &[u8]) -> Keys {
        Keys::new(Key, Key)
    }
}

#[derive(Debug)]
enum State {
    Start,
    WaitServerHello,
    WaitEncryptedExtensions,
    WaitFinished,
    Complete,
}

#[derive(Debug)]
pub struct Session {
    endpoint_type: endpoint::Type,
    state: State,
    transport_parameters: Bytes,
    peer_transport_parameters: Bytes,
    initial: Inbox,
    handshake: Inbox,
}

impl Session {
    fn new<Params: EncoderValue>(endpoint_type: endpoint::Type, transport_parameters: &Params) -> Self {
        Self {
            endpoint_type,
            state: State::Start,
            transport_parameters: transport_parameters.encode_to_vec().into(),
            peer_transport_parameters: Bytes::new(),
            initial: Inbox::default(),
            handshake: Inbox::default(),
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Complete)
    }

    fn poll_client<C: tls::Context>(&mut self, context: &mut C) -> Result<bool, transport::Error> {
        loop {
            match self.state {
                State::Start => {
                    context.send_initial(encode_message(CLIENT_HELLO, &self.transport_parameters));
                    self.state = State::WaitServerHello;
                }
                State::WaitServerHello => {
                    let Some((kind, _)) = self.initial.recv(|max| context.receive_initial(max)) else {
                        return Ok(false);
                    };
                    expect_message(kind, SERVER_HELLO)?;
                    context.on_handshake_keys(Keys::new(Key, Key))?;
                    self.state = State::WaitEncryptedExtensions;
                }
                State::WaitEncryptedExtensions => {
                    let Some((kind, body)) = self.handshake.recv(|max| context.receive_handshake(max))
                    else {
                        return Ok(false);
                    };
                    expect_message(kind, ENCRYPTED_EXTENSIONS)?;
                    self.peer_transport_parameters = body;
                    self.state = State::WaitFinished;
                }
                State::WaitFinished => {
                    let Some((kind, _)) = self.handshake.recv(|max| context.receive_handshake(max))
                    else {
                        return Ok(false);
                    };
                    expect_message(kind, FINISHED)?;

                    context.send_handshake(encode_message(FINISHED, &[]));
                    context.on_one_rtt_keys(
                        Keys::new(Key, Key),
                        tls::ApplicationParameters {
                            transport_parameters: &self.peer_transport_parameters,
                        },
                    )?;
                    context.on_handshake_complete()?;
                    self.state = State::Complete;
                }
                State::Complete => return Ok(true),
            }
        }
    }

    fn poll_server<C: tls::Context>(&mut self, context: &mut C) -> Result<bool, transport::Error> {
        loop {
            match self.state {
                State::Start => {
                    let Some((kind, body)) = self.initial.recv(|max| context.receive_initial(max)) else {
                        return Ok(false);
                    };
                    expect_message(kind, CLIENT_HELLO)?;
                    self.peer_transport_parameters = body;

                    context.send_initial(encode_message(SERVER_HELLO, &[]));
                    context.on_handshake_keys(Keys::new(Key, Key))?;

                    let mut flight = BytesMut::new();
                    flight.extend_from_slice(&encode_message(
                        ENCRYPTED_EXTENSIONS,
                        &self.transport_parameters,
                    ));
                    flight.extend_from_slice(&encode_message(FINISHED, &[]));
                    context.send_handshake(flight.freeze());

                    context.on_one_rtt_keys(
                        Keys::new(Key, Key),
                        tls::ApplicationParameters {
                            transport_parameters: &self.peer_transport_parameters,
                        },
                    )?;
                    self.state = State::WaitFinished;
                }
                State::WaitFinished => {
                    let Some((kind, _)) = self.handshake.recv(|max| context.receive_handshake(max))
                    else {
                        return Ok(false);
                    };
                    expect_message(kind, FINISHED)?;
                    context.on_handshake_complete()?;
                    self.state = State::Complete;
                }
                State::Complete => return Ok(true),
                State::WaitServerHello | State::WaitEncryptedExtensions => {
                    return Err(transport::Error::INTERNAL_ERROR.with_reason("invalid server state"))
                }
            }
        }
    }
}

impl tls::Session for Session {
    #[inline]
    fn poll<C: tls::Context>(&mut self, context: &mut C) -> Poll<Result<(), transport::Error>> {
        let result = match self.endpoint_type {
            endpoint::Type::Client => self.poll_client(context),
            endpoint::Type::Server => self.poll_server(context),
        };

        match result {
            Ok(true) => Poll::Ready(Ok(())),
            Ok(false) => Poll::Pending,
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

#[inline]
fn expect_message(actual: u8, expected: u8) -> Result<(), transport::Error> {
    if actual == expected {
        Ok(())
    } else {
        Err(CryptoError::UNEXPECTED_MESSAGE
            .with_reason("unexpected handshake message")
            .into())
    }
}

fn encode_message(kind: u8, body: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(MESSAGE_HEADER_LEN + body.len());
    message.extend_from_slice(&[kind]);
    message.extend_from_slice(&(body.len() as u16).to_be_bytes());
    message.extend_from_slice(body);
    message.freeze()
}

/// Reassembles handshake messages which may arrive split across CRYPTO frames
#[derive(Debug, Default)]
struct Inbox {
    buffer: BytesMut,
}

impl Inbox {
    fn recv<F: FnMut(Option<usize>) -> Option<Bytes>>(&mut self, mut receive: F) -> Option<(u8, Bytes)> {
        loop {
            if let Some(message) = self.pop_message() {
                return Some(message);
            }
            let chunk = receive(None)?;
            self.buffer.extend_from_slice(&chunk);
        }
    }

    fn pop_message(&mut self) -> Option<(u8, Bytes)> {
        let buffer = DecoderBuffer::new(&self.buffer);
        let (kind, buffer) = buffer.decode::<u8>().ok()?;
        let (len, buffer) = buffer.decode::<u16>().ok()?;
        let len = len as usize;
        buffer.ensure_len(len).ok()?;

        let _ = self.buffer.split_to(MESSAGE_HEADER_LEN);
        let body = self.buffer.split_to(len).freeze();
        Some((kind, body))
    }
}

/// A packet key that checksums instead of encrypting
#[derive(Clone, Copy, Debug, Default)]
pub struct Key;

const TAG_LEN: usize = 16;
const SAMPLE_LEN: usize = 16;

impl Key {
    fn tag(packet_number: u64, header: &[u8], payload: &[u8]) -> [u8; TAG_LEN] {
        // FNV-1a
        let mut checksum: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in header.iter().chain(payload) {
            checksum ^= *byte as u64;
            checksum = checksum.wrapping_mul(0x0100_0000_01b3);
        }

        let mut tag = [0u8; TAG_LEN];
        tag[..8].copy_from_slice(&packet_number.to_be_bytes());
        tag[8..].copy_from_slice(&checksum.to_be_bytes());
        tag
    }
}

impl crypto::Key for Key {
    #[inline]
    fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), CryptoError> {
        let cleartext_len = payload
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(CryptoError::DECRYPT_ERROR)?;
        let (cleartext, tag) = payload.split_at(cleartext_len);

        if Self::tag(packet_number, header, cleartext) != tag {
            return Err(CryptoError::DECRYPT_ERROR);
        }

        Ok(())
    }

    #[inline]
    fn encrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), CryptoError> {
        let cleartext_len = payload
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(CryptoError::INTERNAL_ERROR)?;
        let (cleartext, tag) = payload.split_at_mut(cleartext_len);
        tag.copy_from_slice(&Self::tag(packet_number, header, cleartext));
        Ok(())
    }

    #[inline]
    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    #[inline]
    fn header_protection_mask(&self, _ciphertext_sample: &[u8]) -> HeaderProtectionMask {
        Default::default()
    }

    #[inline]
    fn header_protection_sample_len(&self) -> usize {
        SAMPLE_LEN
    }
}
