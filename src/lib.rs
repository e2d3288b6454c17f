//! # Tagged CBOR
//!
//! A CBOR (Concise Binary Object Representation, RFC 8949) encoder/decoder with
//! an extensible semantic tag registry.
//!
//! ## Features
//! - Full support for CBOR major types 0-7, definite and indefinite lengths
//! - A dynamic [`Value`] model that keeps map order, non-string keys, simple
//!   values and unknown tags intact
//! - Integers beyond 64 bits promoted to bignums (tags 2 and 3) on both sides
//! - RFC 8746 typed arrays (tags 64-86) decoded to native numeric vectors
//! - A [`TagRegistry`] that adds new tagged kinds without touching the encoder
//!   or decoder dispatch
//! - serde integration through [`to_vec`] / [`from_slice`], with zero-copy
//!   `&str` and `&[u8]` borrowing and [`Tagged`] for explicit tags
//! - A lazy [`Walker`] that moves through encoded bytes without decoding them
//!
//! ## Hardening
//! Decoding is bounded by [`DecodeLimits`]: nesting depth is capped and every
//! declared length is checked against the remaining input before anything is
//! allocated.
//!
//! ## Floats
//! Floats are written as 8-byte doubles. With the `compact_floats` feature the
//! shortest IEEE width that represents the value exactly is used instead.
//!
//! ## Example
//! ```rust
//! use tagged_cbor::{TagRegistry, Value, decode, encode, encode_uri, from_slice};
//!
//! let registry = TagRegistry::standard();
//!
//! // 2^64 does not fit a major type 0 argument and becomes a tag 2 bignum
//! let big = Value::integer(1i128 << 64);
//! let bytes = encode(&big, registry).unwrap();
//! assert_eq!(bytes[0], 0xc2);
//! assert_eq!(decode(&bytes, registry).unwrap(), big);
//!
//! // Encode a URI with tag 32; the serde path passes the tag through
//! let mut buf = Vec::new();
//! encode_uri(&mut buf, "https://example.com").unwrap();
//! let decoded: String = from_slice(&buf).unwrap();
//! assert_eq!(decoded, "https://example.com");
//!
//! // The standard registry keeps tag 32 around its payload
//! assert_eq!(
//!     decode(&buf, registry).unwrap(),
//!     Value::tag(32, "https://example.com")
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;

pub mod bignum;
pub mod buffer;
pub mod decode;
pub mod encode;
pub mod error;
pub mod head;
pub mod registry;
pub mod tags;
pub mod typed_array;
pub mod value;
pub mod walker;

pub use bignum::BigInt;
pub use buffer::OutputBuffer;
pub use decode::{DecodeLimits, Decoder};
pub use encode::Encoder;
pub use error::{CborError, FormatViolation, Result};
pub use registry::{TagRegistry, TagRegistryBuilder};
pub use tags::Tagged;
pub use typed_array::TypedArray;
pub use value::Value;
pub use walker::{ItemKind, Walker};

// CBOR major types
pub const MAJOR_UNSIGNED: u8 = 0;
pub const MAJOR_NEGATIVE: u8 = 1;
pub const MAJOR_BYTES: u8 = 2;
pub const MAJOR_TEXT: u8 = 3;
pub const MAJOR_ARRAY: u8 = 4;
pub const MAJOR_MAP: u8 = 5;
pub const MAJOR_TAG: u8 = 6;
pub const MAJOR_SIMPLE: u8 = 7;

// Standard CBOR tags (RFC 8949)
pub const TAG_DATETIME_STRING: u64 = 0; // Standard date/time string (RFC 3339)
pub const TAG_EPOCH_DATETIME: u64 = 1; // Epoch-based date/time
pub const TAG_POSITIVE_BIGNUM: u64 = 2; // Positive bignum
pub const TAG_NEGATIVE_BIGNUM: u64 = 3; // Negative bignum
pub const TAG_URI: u64 = 32; // URI (RFC 3986)
pub const TAG_SET: u64 = 258; // Set of values as an array

// Simple values under major type 7
pub(crate) const SIMPLE_FALSE: u8 = 20;
pub(crate) const SIMPLE_TRUE: u8 = 21;
pub(crate) const SIMPLE_NULL: u8 = 22;
pub(crate) const SIMPLE_UNDEFINED: u8 = 23;

/// Encodes a [`Value`] into a new byte vector.
pub fn encode(value: &Value, registry: &TagRegistry) -> Result<Vec<u8>> {
    encode_into(value, registry, &mut OutputBuffer::new())
}

/// Encodes a [`Value`] using `buffer` for intermediate storage.
///
/// The buffer keeps its largest chunk afterwards, so reusing it across calls
/// avoids regrowing from the initial capacity each time.
pub fn encode_into(
    value: &Value,
    registry: &TagRegistry,
    buffer: &mut OutputBuffer,
) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(&mut *buffer);
    if let Err(err) = encoder.encode_value(value, registry) {
        buffer.clear();
        return Err(err);
    }
    Ok(buffer.finish())
}

/// Decodes the first data item in `bytes`. Anything after it is ignored.
pub fn decode(bytes: &[u8], registry: &TagRegistry) -> Result<Value> {
    decode_prefix(bytes, registry).map(|(value, _)| value)
}

/// Decodes the first data item in `bytes`, returning it with the number of bytes it occupied.
pub fn decode_prefix(bytes: &[u8], registry: &TagRegistry) -> Result<(Value, usize)> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode_value(registry)?;
    Ok((value, decoder.position()))
}

/// Like [`decode`], with explicit resource bounds for untrusted input.
pub fn decode_with_limits(
    bytes: &[u8],
    registry: &TagRegistry,
    limits: DecodeLimits,
) -> Result<Value> {
    decode_prefix_with_limits(bytes, registry, limits).map(|(value, _)| value)
}

/// Like [`decode_prefix`], with explicit resource bounds for untrusted input.
pub fn decode_prefix_with_limits(
    bytes: &[u8],
    registry: &TagRegistry,
    limits: DecodeLimits,
) -> Result<(Value, usize)> {
    let mut decoder = Decoder::with_limits(bytes, limits);
    let value = decoder.decode_value(registry)?;
    Ok((value, decoder.position()))
}

// Convenience functions
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = OutputBuffer::new();
    let mut encoder = Encoder::new(&mut buffer);
    encoder.encode(value)?;
    Ok(buffer.finish())
}

pub fn from_slice<'de, T: Deserialize<'de>>(slice: &'de [u8]) -> Result<T> {
    let mut decoder = Decoder::new(slice);
    decoder.decode()
}

// Tagged value helpers
/// Encode a tagged value (tag number + content)
pub fn encode_tagged<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    tag: u64,
    value: &T,
) -> Result<()> {
    let mut encoder = Encoder::new(writer);
    encoder.write_tag(tag)?;
    encoder.encode(value)
}

/// Helper to encode a date/time string (tag 0)
pub fn encode_datetime_string<W: Write>(writer: &mut W, datetime: &str) -> Result<()> {
    encode_tagged(writer, TAG_DATETIME_STRING, datetime)
}

/// Helper to encode an epoch timestamp (tag 1)
pub fn encode_epoch_datetime<W: Write>(writer: &mut W, epoch: i64) -> Result<()> {
    encode_tagged(writer, TAG_EPOCH_DATETIME, &epoch)
}

/// Helper to encode a URI (tag 32)
pub fn encode_uri<W: Write>(writer: &mut W, uri: &str) -> Result<()> {
    encode_tagged(writer, TAG_URI, uri)
}

/// Helper to encode a set (tag 258) from its members
pub fn encode_set<W: Write, T: Serialize>(writer: &mut W, items: &[T]) -> Result<()> {
    encode_tagged(writer, TAG_SET, items)
}

/// Helper to encode an RFC 8746 typed array under its host byte order tag
pub fn encode_typed_array<W: Write>(writer: &mut W, array: &TypedArray) -> Result<()> {
    encode_tagged(
        writer,
        array.tag(),
        serde_bytes::Bytes::new(&array.to_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
        emails: Vec<String>,
    }

    #[test]
    fn test_basic_types() {
        assert_eq!(from_slice::<u32>(&to_vec(&42u32).unwrap()).unwrap(), 42);
        assert_eq!(from_slice::<i32>(&to_vec(&-42i32).unwrap()).unwrap(), -42);
        assert!(from_slice::<bool>(&to_vec(&true).unwrap()).unwrap());
        assert_eq!(
            from_slice::<String>(&to_vec(&"hello".to_string()).unwrap()).unwrap(),
            "hello"
        );
        assert_eq!(from_slice::<f64>(&to_vec(&2.5f64).unwrap()).unwrap(), 2.5);
        assert_eq!(from_slice::<f32>(&to_vec(&-0.75f32).unwrap()).unwrap(), -0.75);
        assert_eq!(from_slice::<char>(&to_vec(&'é').unwrap()).unwrap(), 'é');
    }

    #[test]
    fn test_struct() {
        let person = Person {
            name: "Alice".to_string(),
            age: 30,
            emails: vec!["alice@example.com".to_string()],
        };
        let encoded = to_vec(&person).unwrap();
        let decoded: Person = from_slice(&encoded).unwrap();
        assert_eq!(person, decoded);
    }

    #[test]
    fn test_map() {
        let mut map = HashMap::new();
        map.insert("key1".to_string(), 100);
        map.insert("key2".to_string(), 200);
        let encoded = to_vec(&map).unwrap();
        let decoded: HashMap<String, i32> = from_slice(&encoded).unwrap();
        assert_eq!(map, decoded);
    }

    #[test]
    fn test_tagged_datetime_string() {
        let mut buf = Vec::new();
        encode_datetime_string(&mut buf, "2024-01-15T10:30:00Z").unwrap();

        // Tag 0 with small value is encoded as 0xC0 (major type 6, value 0)
        assert_eq!(buf[0], 0xC0);

        let decoded: String = from_slice(&buf).unwrap();
        assert_eq!(decoded, "2024-01-15T10:30:00Z");

        let value = decode(&buf, TagRegistry::standard()).unwrap();
        assert_eq!(value, Value::tag(TAG_DATETIME_STRING, "2024-01-15T10:30:00Z"));
    }

    #[test]
    fn test_tagged_epoch_datetime() {
        let mut buf = Vec::new();
        let epoch: i64 = 1705315800;
        encode_epoch_datetime(&mut buf, epoch).unwrap();

        // Tag 1 is encoded as 0xC1 (major type 6, value 1)
        assert_eq!(buf[0], 0xC1);

        let decoded: i64 = from_slice(&buf).unwrap();
        assert_eq!(decoded, epoch);
    }

    #[test]
    fn test_tagged_uri() {
        let mut buf = Vec::new();
        encode_uri(&mut buf, "https://example.com/path").unwrap();

        // Tag 32 is encoded as 0xD8 0x20 (major type 6, additional info 24, value 32)
        assert_eq!(buf[0], 0xD8);
        assert_eq!(buf[1], 32);

        let decoded: String = from_slice(&buf).unwrap();
        assert_eq!(decoded, "https://example.com/path");
    }

    #[test]
    fn test_tagged_set() {
        let mut buf = Vec::new();
        encode_set(&mut buf, &[1u8, 2, 3]).unwrap();
        assert_eq!(buf, hex::decode("d9010283010203").unwrap());

        let value = decode(&buf, TagRegistry::standard()).unwrap();
        let (tag, members) = value.as_tag().unwrap();
        assert_eq!(tag, TAG_SET);
        assert_eq!(members.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_manual_tag_encoding() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf);

        // Manually encode a custom tag (e.g., tag 100) with a string value
        encoder.write_tag(100).unwrap();
        encoder.encode("custom tagged value").unwrap();

        // Tag 100 is encoded as 0xD8 0x64
        assert_eq!(buf[0], 0xD8);
        assert_eq!(buf[1], 100);

        // Unregistered tags pass through to their content
        let decoded: String = from_slice(&buf).unwrap();
        assert_eq!(decoded, "custom tagged value");
        assert_eq!(
            decode(&buf, TagRegistry::standard()).unwrap(),
            Value::from("custom tagged value")
        );
    }

    #[test]
    fn test_typed_array_helper() {
        let array = TypedArray::Uint16(vec![0x1234, 0x5678]);
        let mut buf = Vec::new();
        encode_typed_array(&mut buf, &array).unwrap();

        #[cfg(target_endian = "little")]
        assert_eq!(buf, hex::decode("d8454434127856").unwrap());
        #[cfg(target_endian = "big")]
        assert_eq!(buf, hex::decode("d8414412345678").unwrap());

        let value = decode(&buf, TagRegistry::standard()).unwrap();
        assert_eq!(value, Value::TypedArray(array));
    }

    #[test]
    fn test_encode_into_reuses_buffer() {
        let registry = TagRegistry::standard();
        let mut buffer = OutputBuffer::with_capacity(4);
        let long = Value::from("a fairly long text value that spills the first chunk");

        let first = encode_into(&long, registry, &mut buffer).unwrap();
        let grown = buffer.chunk_capacity();
        assert!(grown > 4);
        assert!(buffer.is_empty());

        let second = encode_into(&long, registry, &mut buffer).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, encode(&long, registry).unwrap());
    }

    #[test]
    fn test_encode_into_failure_leaves_buffer_empty() {
        let mut buffer = OutputBuffer::new();
        let value = Value::Array(vec![
            Value::from(1),
            Value::TypedArray(TypedArray::Uint8(vec![1])),
        ]);
        assert!(encode_into(&value, &TagRegistry::empty(), &mut buffer).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_prefix_reports_consumed_bytes() {
        let bytes = hex::decode("8201020304").unwrap();
        let (value, used) = decode_prefix(&bytes, TagRegistry::standard()).unwrap();
        assert_eq!(value, Value::Array(vec![Value::from(1), Value::from(2)]));
        assert_eq!(used, 3);
        assert_eq!(decode(&bytes, TagRegistry::standard()).unwrap(), value);
    }

    #[test]
    fn test_items_followed_by_more_input() {
        let registry = TagRegistry::standard();
        assert_eq!(decode(&hex::decode("6161").unwrap(), registry).unwrap(), Value::from("a"));

        let bytes = hex::decode("6161c2490100000000000000000a").unwrap();
        let (first, used) = decode_prefix(&bytes, registry).unwrap();
        assert_eq!((first, used), (Value::from("a"), 2));
        let (second, used) = decode_prefix(&bytes[2..], registry).unwrap();
        assert_eq!((second, used), (Value::integer(1i128 << 64), 11));
        let third: u8 = from_slice(&bytes[13..]).unwrap();
        assert_eq!(third, 10);

        let limits = DecodeLimits {
            max_depth: 1,
            ..DecodeLimits::default()
        };
        let (value, used) = decode_prefix_with_limits(&bytes, registry, limits).unwrap();
        assert_eq!((value, used), (Value::from("a"), 2));
        assert_eq!(
            decode_prefix_with_limits(&bytes[2..], registry, limits).unwrap(),
            (Value::integer(1i128 << 64), 11)
        );
    }

    #[test]
    fn test_vec_u8_as_array() {
        // Without serde_bytes, Vec<u8> serializes as an array
        let data: Vec<u8> = vec![1, 2, 3];
        let encoded = to_vec(&data).unwrap();
        assert_eq!(encoded[0], (MAJOR_ARRAY << 5) | 3);

        let decoded: Vec<u8> = from_slice(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_byte_string_overhead() {
        use serde_bytes::ByteBuf;

        // 1 byte major type + 2 bytes for length (1024 = 0x400)
        let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        let encoded = to_vec(&ByteBuf::from(data.clone())).unwrap();
        assert_eq!(encoded.len(), 1024 + 3);
        assert_eq!(encoded[0], (MAJOR_BYTES << 5) | 25);
        assert_eq!(&encoded[1..3], &[0x04, 0x00]);

        let decoded: ByteBuf = from_slice(&encoded).unwrap();
        assert_eq!(decoded.into_vec(), data);
    }
}
