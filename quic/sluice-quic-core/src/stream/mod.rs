// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

mod error;
mod id;
pub mod state;
mod type_;

pub use error::*;
pub use id::*;
pub use type_::*;
