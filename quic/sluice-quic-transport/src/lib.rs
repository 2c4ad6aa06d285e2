// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! This crate contains the stateful components of the sluice QUIC engine:
//! connections, streams, flow control, ACK generation and loss recovery.
//!
//! Nothing in here performs I/O. Datagrams are handed to
//! [`connection::Connection::receive`] and pulled out of
//! [`connection::Connection::poll_transmit`], and the caller drives timers through
//! [`connection::Connection::next_timeout`] and [`connection::Connection::on_timeout`].

#![forbid(unsafe_code)]
#![deny(unused_must_use)]
extern crate alloc;

#[macro_use]
extern crate sluice_quic_core;

mod ack;
mod buffer;
mod flow_control;
mod path;
mod space;
mod sync;
mod transmission;

pub mod connection;
pub mod endpoint;
pub mod recovery;
pub mod stream;
