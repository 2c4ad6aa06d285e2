// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Returns early with `$ret` when the condition does not hold
#[macro_export]
macro_rules! ensure {
    (let $pat:pat = $expr:expr, $ret:expr) => {
        let $pat = $expr else {
            return $ret;
        };
    };
    ($cond:expr, $ret:expr) => {
        if !($cond) {
            return $ret;
        }
    };
    ($cond:expr) => {
        $crate::ensure!($cond, ());
    };
}
