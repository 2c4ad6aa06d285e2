// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub use crate::{DecoderBuffer, DecoderError, DecoderValue, Encoder, EncoderBuffer, EncoderValue};
use alloc::vec::Vec;

pub type Error = DecoderError;

/// Encodes `value`, decodes it back and asserts equality; returns the encoding
#[macro_export]
macro_rules! assert_codec_round_trip_value {
    ($ty:ty, $value:expr) => {{
        $crate::ensure_codec_round_trip_value!($ty, $value).unwrap()
    }};
}

#[macro_export]
macro_rules! ensure_codec_round_trip_value {
    ($ty:ty, $value:expr) => {{
        fn execute_round_trip(expected_value: &$ty) -> Result<Vec<u8>, $crate::testing::Error> {
            let expected_bytes = $crate::testing::encode(expected_value)?;
            $crate::testing::ensure_decoding_matches(expected_value, &expected_bytes)?;
            Ok(expected_bytes)
        }

        execute_round_trip(&$value)
    }};
}

/// Decodes every value of `$ty` found in `$bytes` and round-trips each one
#[macro_export]
macro_rules! assert_codec_round_trip_bytes {
    ($ty:ty, $bytes:expr) => {{
        $crate::ensure_codec_round_trip_bytes!($ty, $bytes).unwrap()
    }};
}

#[macro_export]
macro_rules! ensure_codec_round_trip_bytes {
    ($ty:ty, $bytes:expr) => {{
        fn execute_all_round_trip(buffer: &[u8]) -> Result<Vec<$ty>, $crate::testing::Error> {
            let mut buffer = $crate::DecoderBuffer::new(buffer);
            let mut values = vec![];

            while let Ok((value, remaining)) = buffer.decode::<$ty>() {
                $crate::ensure_codec_round_trip_value!($ty, value)?;
                values.push(value);

                // zero-sized encodings would otherwise loop forever
                if remaining.len() == buffer.len() || remaining.is_empty() {
                    break;
                }
                buffer = remaining;
            }

            Ok(values)
        }

        execute_all_round_trip(AsRef::<[u8]>::as_ref(&$bytes))
    }};
}

pub fn encode<T: EncoderValue>(value: &T) -> Result<Vec<u8>, Error> {
    let len = value.encoding_size();
    let mut buffer = alloc::vec![0u8; len];
    let mut encoder = EncoderBuffer::new(&mut buffer);
    value.encode(&mut encoder);
    if encoder.len() != len {
        return Err(DecoderError::InvariantViolation(
            "encoding size did not match the estimate",
        ));
    }
    Ok(buffer)
}

pub fn ensure_decoding_matches<'a, T: DecoderValue<'a> + PartialEq + core::fmt::Debug>(
    expected_value: &T,
    expected_bytes: &'a [u8],
) -> Result<(), Error> {
    let (actual_value, remaining) = DecoderBuffer::new(expected_bytes).decode::<T>()?;
    remaining.ensure_empty()?;
    if expected_value != &actual_value {
        return Err(DecoderError::InvariantViolation(
            "decoded value did not match the encoded value",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn integer_round_trip() {
        bolero::check!().with_type().cloned().for_each(|value: u64| {
            let bytes = assert_codec_round_trip_value!(u64, value);
            assert_eq!(bytes, value.to_be_bytes());
        });
    }

    #[test]
    fn bytes_round_trip() {
        bolero::check!().for_each(|bytes: &[u8]| {
            let values = assert_codec_round_trip_bytes!(u16, bytes);
            assert_eq!(values.len(), bytes.len() / 2);
        });
    }
}
