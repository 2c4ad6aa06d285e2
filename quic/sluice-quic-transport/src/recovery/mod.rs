// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub use manager::*;
pub use sent_packets::*;
pub use sluice_quic_core::recovery::*;

mod manager;
mod pto;
mod sent_packets;
