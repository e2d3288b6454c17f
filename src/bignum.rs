use std::fmt;

use crate::{TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM};

/// Arbitrary-precision signed integer.
///
/// Stored as a sign and the minimal big-endian magnitude, which is exactly the
/// payload layout of CBOR tags 2 and 3 (tag 3 biased by one).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInt {
    negative: bool,
    magnitude: Vec<u8>,
}

impl BigInt {
    /// Builds a value from a sign and a big-endian magnitude. Leading zero bytes are dropped.
    pub fn from_parts(negative: bool, magnitude: &[u8]) -> Self {
        let magnitude = trim(magnitude).to_vec();
        BigInt {
            negative: negative && !magnitude.is_empty(),
            magnitude,
        }
    }

    /// Interprets the byte string payload of tag 2 (`n`) or tag 3 (`-1 - n`).
    pub fn from_tag_payload(negative: bool, payload: &[u8]) -> Self {
        if negative {
            let mut magnitude = trim(payload).to_vec();
            increment(&mut magnitude);
            BigInt {
                negative: true,
                magnitude,
            }
        } else {
            Self::from_parts(false, payload)
        }
    }

    /// Returns the tag number and byte string payload that represent this value.
    pub fn to_tag_payload(&self) -> (u64, Vec<u8>) {
        if self.negative {
            let mut biased = self.magnitude.clone();
            decrement(&mut biased);
            (TAG_NEGATIVE_BIGNUM, trim(&biased).to_vec())
        } else {
            (TAG_POSITIVE_BIGNUM, self.magnitude.clone())
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Big-endian magnitude without leading zeros; empty for zero.
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    /// The value, if it is non-negative and fits in a `u64`.
    pub fn to_u64(&self) -> Option<u64> {
        if self.negative {
            return None;
        }
        fold_u64(&self.magnitude)
    }

    /// For negative values, the CBOR major type 1 argument `-1 - self`, if it fits in a `u64`.
    pub fn to_negative_argument(&self) -> Option<u64> {
        if !self.negative {
            return None;
        }
        let mut biased = self.magnitude.clone();
        decrement(&mut biased);
        fold_u64(trim(&biased))
    }

    pub fn to_u128(&self) -> Option<u128> {
        if self.negative || self.magnitude.len() > 16 {
            return None;
        }
        Some(fold_u128(&self.magnitude))
    }

    pub fn to_i128(&self) -> Option<i128> {
        if self.magnitude.len() > 16 {
            return None;
        }
        let magnitude = fold_u128(&self.magnitude);
        if self.negative {
            if magnitude == i128::MIN.unsigned_abs() {
                Some(i128::MIN)
            } else {
                i128::try_from(magnitude).ok().map(|m| -m)
            }
        } else {
            i128::try_from(magnitude).ok()
        }
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        BigInt::from_parts(false, &value.to_be_bytes())
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        BigInt::from_parts(value < 0, &value.unsigned_abs().to_be_bytes())
    }
}

impl From<u128> for BigInt {
    fn from(value: u128) -> Self {
        BigInt::from_parts(false, &value.to_be_bytes())
    }
}

impl From<i128> for BigInt {
    fn from(value: i128) -> Self {
        BigInt::from_parts(value < 0, &value.unsigned_abs().to_be_bytes())
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.magnitude.is_empty() {
            return f.write_str("0");
        }
        // repeated division by 10^19, least significant group first
        const GROUP: u64 = 10_000_000_000_000_000_000;
        let mut digits = self.magnitude.clone();
        let mut groups = Vec::new();
        while !digits.is_empty() {
            let mut remainder: u128 = 0;
            for byte in digits.iter_mut() {
                let acc = (remainder << 8) | *byte as u128;
                *byte = (acc / GROUP as u128) as u8;
                remainder = acc % GROUP as u128;
            }
            groups.push(remainder as u64);
            let keep = trim(&digits).len();
            digits.drain(..digits.len() - keep);
        }
        let mut out = String::new();
        let mut iter = groups.iter().rev();
        if let Some(first) = iter.next() {
            out.push_str(&first.to_string());
        }
        for group in iter {
            out.push_str(&format!("{group:019}"));
        }
        f.pad_integral(!self.negative, "", &out)
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn fold_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn fold_u128(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128)
}

fn increment(bytes: &mut Vec<u8>) {
    for byte in bytes.iter_mut().rev() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            return;
        }
    }
    bytes.insert(0, 1);
}

/// Subtracts one from a non-zero big-endian magnitude.
fn decrement(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().rev() {
        let (next, borrow) = byte.overflowing_sub(1);
        *byte = next;
        if !borrow {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_to_the_64() {
        let payload = [1, 0, 0, 0, 0, 0, 0, 0, 0];
        let value = BigInt::from_tag_payload(false, &payload);
        assert_eq!(value.to_u64(), None);
        assert_eq!(value.to_u128(), Some(1u128 << 64));
        assert_eq!(value.to_tag_payload(), (TAG_POSITIVE_BIGNUM, payload.to_vec()));
        assert_eq!(value.to_string(), "18446744073709551616");
    }

    #[test]
    fn test_negative_bias() {
        // -18446744073709551617 is tag 3 over 2^64
        let value = BigInt::from_tag_payload(true, &[1, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(value.is_negative());
        assert_eq!(value.to_i128(), Some(-(1i128 << 64) - 1));
        assert_eq!(value.to_negative_argument(), None);
        assert_eq!(value.to_string(), "-18446744073709551617");

        let (tag, payload) = value.to_tag_payload();
        assert_eq!(tag, TAG_NEGATIVE_BIGNUM);
        assert_eq!(payload, vec![1, 0, 0, 0, 0, 0, 0, 0, 0]);

        // tag 3 over an all-ones payload carries into a new byte
        let value = BigInt::from_tag_payload(true, &[0xff; 8]);
        assert_eq!(value.magnitude(), &[1, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_small_values() {
        let value = BigInt::from(-1i64);
        assert_eq!(value.to_negative_argument(), Some(0));
        assert_eq!(value.to_tag_payload(), (TAG_NEGATIVE_BIGNUM, vec![]));

        let zero = BigInt::from_parts(true, &[0, 0]);
        assert!(!zero.is_negative());
        assert_eq!(zero.to_u64(), Some(0));
        assert_eq!(zero.to_string(), "0");

        assert_eq!(BigInt::from(u64::MAX).to_u64(), Some(u64::MAX));
        assert_eq!(BigInt::from(i128::MIN).to_i128(), Some(i128::MIN));
        assert_eq!(BigInt::from(-42i128).to_string(), "-42");
    }

    #[test]
    fn test_display_multi_group() {
        let value = BigInt::from(u128::MAX);
        assert_eq!(value.to_string(), u128::MAX.to_string());
        let value = BigInt::from(i128::MIN);
        assert_eq!(value.to_string(), i128::MIN.to_string());
    }
}
