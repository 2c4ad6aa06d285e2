// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tools for synchronizing state between peers

pub mod flag;
mod value_sync;

pub use flag::Flag;
pub use value_sync::{ValueSync, ValueWriter};
