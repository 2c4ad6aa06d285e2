// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Byte buffers for the sending and receiving sides of streams
//!
//! Both CRYPTO and STREAM data flow through these buffers.

mod reassembler;
mod send;

pub use reassembler::Reassembler;
pub use send::{Chunk, SendBuffer};

#[cfg(test)]
mod tests;
