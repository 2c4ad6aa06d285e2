// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::{Reassembler, SendBuffer},
    recovery::SentFrame,
    transmission::WriteContext,
};
use bytes::Bytes;
use sluice_quic_core::{frame, transport, varint::VarInt};

//= https://www.rfc-editor.org/rfc/rfc9000#section-7.5
//# Implementations MUST support buffering at least 4096 bytes of data
//# received in out-of-order CRYPTO frames.
const RX_MAX_BUFFER_CAPACITY: u64 = 64 * 1024;

/// The CRYPTO frame stream of one packet number space
#[derive(Debug, Default)]
pub struct CryptoStream {
    pub tx: SendBuffer,
    pub rx: Reassembler,
}

impl CryptoStream {
    pub fn on_crypto_frame(&mut self, frame: &frame::Crypto<&[u8]>) -> Result<(), transport::Error> {
        let offset = frame.offset.as_u64();
        let end = offset + frame.data.len() as u64;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-7.5
        //# If an endpoint does not expand its buffer, it MUST close
        //# the connection with a CRYPTO_BUFFER_EXCEEDED error code.
        ensure!(
            end.saturating_sub(self.rx.consumed_offset()) <= RX_MAX_BUFFER_CAPACITY,
            Err(transport::Error::CRYPTO_BUFFER_EXCEEDED)
        );

        self.rx.write_at(offset, frame.data);
        Ok(())
    }

    /// Hands received bytes to the handshake
    #[inline]
    pub fn receive(&mut self, max_len: Option<usize>) -> Option<Bytes> {
        self.rx.pop(max_len)
    }

    /// Queues handshake bytes for transmission
    #[inline]
    pub fn send(&mut self, bytes: &[u8]) {
        self.tx.write(bytes);
    }

    #[inline]
    pub fn has_transmission_interest(&self) -> bool {
        self.tx.has_transmission_interest()
    }

    /// Writes as many CRYPTO frames as fit into the packet
    ///
    /// Crypto data is not flow controlled, but it is congestion controlled.
    pub fn on_transmit<W: WriteContext>(&mut self, context: &mut W) {
        ensure!(context.transmission_constraint().can_transmit());

        while let Some(chunk) = self.tx.next_chunk(u64::MAX, usize::MAX) {
            let Ok(offset) = VarInt::new(chunk.offset) else {
                return;
            };
            let max_len = frame::Crypto::<&[u8]>::max_data_len(context.remaining_capacity(), offset);
            ensure!(max_len > 0);

            let data = &chunk.data[..chunk.data.len().min(max_len)];
            let len = data.len();
            let frame = frame::Crypto { offset, data };
            let sent = SentFrame::Crypto {
                offset: chunk.offset,
                len: len as u32,
            };

            ensure!(context.write_frame(&frame, sent));
            self.tx.on_transmit(chunk.offset, len, false);
        }
    }

    #[inline]
    pub fn on_ack(&mut self, offset: u64, len: u32) {
        self.tx.on_ack(offset, len as usize, false);
    }

    #[inline]
    pub fn on_lost(&mut self, offset: u64, len: u32) {
        self.tx.on_lost(offset, len as usize, false);
    }
}
