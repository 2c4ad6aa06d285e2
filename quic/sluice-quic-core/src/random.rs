// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// A source of unpredictable bytes supplied by the application
///
/// Connection IDs are drawn from [`Generator::public_random_fill`]; anything
/// that must stay secret uses [`Generator::private_random_fill`].
pub trait Generator: 'static + Send {
    /// Fills `dest` with bytes that may appear on the wire
    fn public_random_fill(&mut self, dest: &mut [u8]);

    /// Fills `dest` with bytes that never leave the endpoint
    fn private_random_fill(&mut self, dest: &mut [u8]);
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    /// Produces a distinct, predictable byte pattern on every call
    #[derive(Debug, Default)]
    pub struct Generator(pub u8);

    impl Generator {
        fn fill(&mut self, first: u8, dest: &mut [u8]) {
            let mut byte = first;
            for slot in dest {
                *slot = byte;
                byte = byte.wrapping_add(1);
            }
            self.0 = self.0.wrapping_add(1);
        }
    }

    impl super::Generator for Generator {
        fn public_random_fill(&mut self, dest: &mut [u8]) {
            self.fill(self.0, dest)
        }

        fn private_random_fill(&mut self, dest: &mut [u8]) {
            self.fill(!self.0, dest)
        }
    }
}
