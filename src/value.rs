use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
    ser::{Error as _, SerializeMap},
};
use serde_bytes::ByteBuf;
use std::fmt;

use crate::bignum::BigInt;
use crate::tags::Tagged;
use crate::typed_array::TypedArray;

/// Dynamic CBOR value type for working with untyped CBOR data
///
/// This is the output of [`decode`](crate::decode) and the input of
/// [`encode`](crate::encode). Maps keep their entries in wire order and may use
/// any value as a key.
///
/// # Example
/// ```
/// use tagged_cbor::{TagRegistry, Value, decode, encode};
///
/// let value = Value::Map(vec![
///     (Value::from("name"), Value::from("Alice")),
///     (Value::from(1), Value::from(vec![Value::from(true), Value::Null])),
/// ]);
///
/// let registry = TagRegistry::standard();
/// let bytes = encode(&value, registry).unwrap();
/// assert_eq!(decode(&bytes, registry).unwrap(), value);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Major type 0
    Unsigned(u64),
    /// Major type 1, holding the wire argument `n` for the value `-1 - n`
    Negative(u64),
    /// Integer outside the 64-bit ranges (tags 2 and 3)
    BigInt(BigInt),
    /// Half, single or double precision float, widened
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    /// Key/value pairs in wire order
    Map(Vec<(Value, Value)>),
    Bool(bool),
    Null,
    Undefined,
    /// Simple value other than false, true, null and undefined
    Simple(u8),
    /// Tag number and content, as left by the registry
    Tag(u64, Box<Value>),
    /// RFC 8746 typed array (tags 64-86)
    TypedArray(TypedArray),
}

impl Value {
    /// Builds an integer value, using the 64-bit variants whenever they can hold it.
    pub fn integer(value: i128) -> Self {
        Value::from(BigInt::from(value))
    }

    /// Builds a tagged value.
    pub fn tag(tag: u64, content: impl Into<Value>) -> Self {
        Value::Tag(tag, Box::new(content.into()))
    }

    /// A short name for the kind of value, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unsigned(_) | Value::Negative(_) => "integer",
            Value::BigInt(_) => "bignum",
            Value::Float(_) => "float",
            Value::Bytes(_) => "byte string",
            Value::Text(_) => "text string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Simple(_) => "simple value",
            Value::Tag(_, _) => "tag",
            Value::TypedArray(_) => "typed array",
        }
    }

    /// Returns true if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if the value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Returns true for integers of any size, including bignums
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Unsigned(_) | Value::Negative(_) | Value::BigInt(_))
    }

    /// Returns true if the value is a float
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// Returns true if the value is bytes
    pub fn is_bytes(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    /// Returns true if the value is text
    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    /// Returns true if the value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Returns true if the value is a map
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Returns true if the value is tagged
    pub fn is_tag(&self) -> bool {
        matches!(self, Value::Tag(_, _))
    }

    /// Returns the value as a boolean, if it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an `i64`, if it is an integer in range
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|n| i64::try_from(n).ok())
    }

    /// Returns the value as a `u64`, if it is a non-negative integer in range
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(n) => Some(*n),
            Value::BigInt(big) => big.to_u64(),
            _ => None,
        }
    }

    /// Returns the value as an `i128`, if it is an integer in range
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Unsigned(n) => Some(*n as i128),
            Value::Negative(n) => Some(-1 - *n as i128),
            Value::BigInt(big) => big.to_i128(),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Value::BigInt(big) => Some(big),
            _ => None,
        }
    }

    /// Returns the value as a float, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the value as bytes, if it is a byte string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as text, if it is a text string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an array, if it is one
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the map entries in wire order, if this is a map
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the tag number and inner value, if this is a tagged value
    pub fn as_tag(&self) -> Option<(u64, &Value)> {
        match self {
            Value::Tag(tag, value) => Some((*tag, value)),
            _ => None,
        }
    }

    pub fn as_typed_array(&self) -> Option<&TypedArray> {
        match self {
            Value::TypedArray(array) => Some(array),
            _ => None,
        }
    }

    /// Looks up the first entry whose key equals `key`, if this is a map
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Looks up a text key, if this is a map
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

impl From<BigInt> for Value {
    fn from(big: BigInt) -> Self {
        if let Some(n) = big.to_u64() {
            Value::Unsigned(n)
        } else if let Some(n) = big.to_negative_argument() {
            Value::Negative(n)
        } else {
            Value::BigInt(big)
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Unsigned(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        if n >= 0 {
            Value::Unsigned(n as u64)
        } else {
            Value::Negative((-1 - n) as u64)
        }
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Unsigned(n as u64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::from(n as i64)
    }
}

impl From<u128> for Value {
    fn from(n: u128) -> Self {
        Value::from(BigInt::from(n))
    }
}

impl From<i128> for Value {
    fn from(n: i128) -> Self {
        Value::integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<TypedArray> for Value {
    fn from(array: TypedArray) -> Self {
        Value::TypedArray(array)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Undefined => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Unsigned(n) => serializer.serialize_u64(*n),
            Value::Negative(n) => match i64::try_from(*n) {
                Ok(n) => serializer.serialize_i64(-1 - n),
                Err(_) => serializer.serialize_i128(-1 - *n as i128),
            },
            Value::BigInt(big) => {
                if let Some(n) = big.to_i128() {
                    serializer.serialize_i128(n)
                } else if let Some(n) = big.to_u128() {
                    serializer.serialize_u128(n)
                } else if serializer.is_human_readable() {
                    serializer.collect_str(big)
                } else {
                    let (tag, payload) = big.to_tag_payload();
                    Tagged::new(Some(tag), ByteBuf::from(payload)).serialize(serializer)
                }
            }
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(a) => a.serialize(serializer),
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (key, value) in m {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Simple(n) => Err(S::Error::custom(format!(
                "simple value {n} has no serde representation"
            ))),
            Value::Tag(tag, value) => Tagged::new(Some(*tag), value.as_ref()).serialize(serializer),
            Value::TypedArray(array) => array.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any valid CBOR value")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Value, E> {
                Ok(Value::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Value, E> {
                Ok(Value::from(value))
            }

            fn visit_i128<E>(self, value: i128) -> Result<Value, E> {
                Ok(Value::integer(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Value, E> {
                Ok(Value::Unsigned(value))
            }

            fn visit_u128<E>(self, value: u128) -> Result<Value, E> {
                Ok(Value::from(value))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Value, E> {
                Ok(Value::Float(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Text(value.to_owned()))
            }

            fn visit_string<E>(self, value: String) -> Result<Value, E> {
                Ok(Value::Text(value))
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Bytes(value.to_vec()))
            }

            fn visit_byte_buf<E>(self, value: Vec<u8>) -> Result<Value, E> {
                Ok(Value::Bytes(value))
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_seq<V>(self, mut visitor: V) -> Result<Value, V::Error>
            where
                V: de::SeqAccess<'de>,
            {
                let mut vec = Vec::with_capacity(visitor.size_hint().unwrap_or(0).min(4096));
                while let Some(elem) = visitor.next_element()? {
                    vec.push(elem);
                }
                Ok(Value::Array(vec))
            }

            fn visit_map<V>(self, mut visitor: V) -> Result<Value, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = visitor.next_entry()? {
                    entries.push((key, value));
                }
                Ok(Value::Map(entries))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TagRegistry, decode, encode, from_slice, to_vec};

    fn roundtrip(value: &Value) -> Value {
        let registry = TagRegistry::standard();
        decode(&encode(value, registry).unwrap(), registry).unwrap()
    }

    #[test]
    fn test_value_null() {
        let value = Value::Null;
        assert!(value.is_null());
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_value_bool() {
        let value = Value::Bool(true);
        assert!(value.is_bool());
        assert_eq!(value.as_bool(), Some(true));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_value_integer() {
        let value = Value::from(42);
        assert!(value.is_integer());
        assert_eq!(value.as_i64(), Some(42));
        assert_eq!(roundtrip(&value), value);

        let value = Value::from(-500i64);
        assert_eq!(value, Value::Negative(499));
        assert_eq!(value.as_i64(), Some(-500));
        assert_eq!(value.as_u64(), None);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_integer_normalization() {
        assert_eq!(Value::integer(7), Value::Unsigned(7));
        assert_eq!(Value::integer(-1), Value::Negative(0));
        assert_eq!(
            Value::integer(-(1i128 << 64)),
            Value::Negative(u64::MAX)
        );
        assert!(matches!(Value::integer(1i128 << 64), Value::BigInt(_)));
        assert!(matches!(Value::integer(-(1i128 << 64) - 1), Value::BigInt(_)));
        assert_eq!(Value::integer(i128::MAX).as_i128(), Some(i128::MAX));
    }

    #[test]
    fn test_value_text() {
        let value = Value::from("hello");
        assert!(value.is_text());
        assert_eq!(value.as_str(), Some("hello"));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_value_array() {
        let value = Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert!(value.is_array());
        assert_eq!(value.as_array().unwrap().len(), 3);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_value_map_keeps_wire_order() {
        let value = Value::Map(vec![
            (Value::from("z"), Value::from(1)),
            (Value::from(-3i64), Value::from("neg key")),
            (Value::from("a"), Value::Null),
        ]);
        assert!(value.is_map());
        assert_eq!(value.get_str("z"), Some(&Value::from(1)));
        assert_eq!(value.get(&Value::from(-3i64)), Some(&Value::from("neg key")));
        assert_eq!(value.get_str("missing"), None);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_value_bytes() {
        let value = Value::Bytes(vec![1, 2, 3, 4, 5]);
        assert!(value.is_bytes());
        assert_eq!(value.as_bytes(), Some(&[1, 2, 3, 4, 5][..]));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_value_through_serde_path() {
        // the serde path has no registry, so tags and undefined are lossy
        let value = Value::Array(vec![
            Value::from(1),
            Value::from(-1i64),
            Value::from("two"),
            Value::Bytes(vec![3]),
            Value::Map(vec![(Value::from("k"), Value::Float(0.5))]),
        ]);
        let bytes = to_vec(&value).unwrap();
        assert_eq!(
            bytes,
            encode(&value, TagRegistry::standard()).unwrap(),
            "serde and native encoders agree on untagged data"
        );
        let decoded: Value = from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_bignum_through_serde_path() {
        let value = Value::integer(1i128 << 70);
        let bytes = to_vec(&value).unwrap();
        assert_eq!(bytes[0], 0xc2);
        let decoded: Value = from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_simple_value_has_no_serde_form() {
        assert!(to_vec(&Value::Simple(16)).is_err());
    }

    #[test]
    fn test_value_to_json() {
        let value = Value::Map(vec![
            (Value::from("n"), Value::from(-2i64)),
            (Value::from("list"), Value::from(vec![Value::Bool(false), Value::Null])),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"n":-2,"list":[false,null]}"#);
    }
}
