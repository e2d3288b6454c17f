use std::io::Write;

use serde::Serialize;
use tracing::debug;

use crate::bignum::BigInt;
use crate::decode::DEFAULT_MAX_DEPTH;
use crate::error::{CborError, Result};
use crate::head::{BREAK, INDEFINITE, write_float, write_head};
use crate::registry::TagRegistry;
use crate::tags::TAGGED_TOKEN;
use crate::value::Value;
use crate::{
    MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_SIMPLE, MAJOR_TAG, MAJOR_TEXT,
    MAJOR_UNSIGNED, SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE, SIMPLE_UNDEFINED,
};

/// Deepest nesting of arrays, maps and tags [`Encoder::encode_value`] accepts.
pub const MAX_VALUE_DEPTH: usize = DEFAULT_MAX_DEPTH;

/// Where the encoder is inside a [`Tagged`](crate::Tagged) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    Idle,
    /// Saw the tagged newtype, expecting the `(tag, value)` tuple.
    AwaitingPair,
    /// Inside the tuple, the next `u64` is the tag number.
    AwaitingNumber,
}

/// Writes CBOR to any [`Write`] sink.
///
/// Supports both the dynamic [`Value`] model through [`Encoder::encode_value`]
/// and any `T: Serialize` through [`Encoder::encode`].
pub struct Encoder<W: Write> {
    writer: W,
    tagging: TagState,
    /// Arrays, maps and tags currently open in [`Encoder::encode_value`].
    depth: usize,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Encoder {
            writer,
            tagging: TagState::Idle,
            depth: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_type_value(&mut self, major: u8, value: u64) -> Result<()> {
        write_head(&mut self.writer, major, value)?;
        Ok(())
    }

    /// Writes a tag head. The next item written becomes its content.
    pub fn write_tag(&mut self, tag: u64) -> Result<()> {
        self.write_type_value(MAJOR_TAG, tag)
    }

    /// Starts an indefinite-length byte string, text string, array or map.
    pub fn begin_indefinite(&mut self, major: u8) -> Result<()> {
        if !matches!(major, MAJOR_BYTES | MAJOR_TEXT | MAJOR_ARRAY | MAJOR_MAP) {
            return Err(CborError::Unencodable(format!(
                "major type {major} has no indefinite-length form"
            )));
        }
        self.writer.write_all(&[(major << 5) | INDEFINITE])?;
        Ok(())
    }

    /// Terminates the innermost indefinite-length item.
    pub fn write_break(&mut self) -> Result<()> {
        self.writer.write_all(&[BREAK])?;
        Ok(())
    }

    pub fn encode<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self)
    }

    /// Encodes a [`Value`], consulting `registry` for values that are not primitive.
    ///
    /// Values nested more than [`MAX_VALUE_DEPTH`] arrays, maps and tags deep
    /// are rejected as [`CborError::Unencodable`], the same bound the decoder
    /// applies by default.
    pub fn encode_value(&mut self, value: &Value, registry: &TagRegistry) -> Result<()> {
        match value {
            Value::Unsigned(n) => self.write_type_value(MAJOR_UNSIGNED, *n),
            Value::Negative(n) => self.write_type_value(MAJOR_NEGATIVE, *n),
            Value::BigInt(big) => self.write_bigint(big),
            Value::Float(f) => {
                write_float(&mut self.writer, *f)?;
                Ok(())
            }
            Value::Bool(false) => self.write_simple(SIMPLE_FALSE),
            Value::Bool(true) => self.write_simple(SIMPLE_TRUE),
            Value::Null => self.write_simple(SIMPLE_NULL),
            Value::Undefined => self.write_simple(SIMPLE_UNDEFINED),
            Value::Text(s) => self.write_bytes(MAJOR_TEXT, s.as_bytes()),
            Value::Bytes(b) => self.write_bytes(MAJOR_BYTES, b),
            Value::Array(items) => self.nested(|encoder| {
                encoder.write_type_value(MAJOR_ARRAY, items.len() as u64)?;
                for item in items {
                    encoder.encode_value(item, registry)?;
                }
                Ok(())
            }),
            _ => {
                if let Some((tag, content)) = registry.tag_for(value) {
                    return self.nested(|encoder| {
                        encoder.write_tag(tag)?;
                        encoder.encode_value(&content, registry)
                    });
                }
                match value {
                    Value::Map(entries) => self.nested(|encoder| {
                        encoder.write_type_value(MAJOR_MAP, entries.len() as u64)?;
                        for (key, item) in entries {
                            encoder.encode_value(key, registry)?;
                            encoder.encode_value(item, registry)?;
                        }
                        Ok(())
                    }),
                    Value::Simple(n) => self.write_simple(*n),
                    other => {
                        debug!(kind = other.kind_name(), "no encode capability registered");
                        Err(CborError::Unencodable(format!(
                            "{} has no registered tag capability",
                            other.kind_name()
                        )))
                    }
                }
            }
        }
    }

    fn nested(&mut self, encode: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.depth >= MAX_VALUE_DEPTH {
            debug!(max_depth = MAX_VALUE_DEPTH, "value nested too deep to encode");
            return Err(CborError::Unencodable(format!(
                "nesting deeper than {MAX_VALUE_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = encode(self);
        self.depth -= 1;
        result
    }

    fn write_simple(&mut self, code: u8) -> Result<()> {
        // 24..=31 would collide with the argument width and break codes
        if (24..32).contains(&code) {
            return Err(CborError::Unencodable(format!(
                "simple value {code} is reserved"
            )));
        }
        self.write_type_value(MAJOR_SIMPLE, code as u64)
    }

    fn write_bytes(&mut self, major: u8, bytes: &[u8]) -> Result<()> {
        self.write_type_value(major, bytes.len() as u64)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn write_bigint(&mut self, big: &BigInt) -> Result<()> {
        if let Some(n) = big.to_u64() {
            return self.write_type_value(MAJOR_UNSIGNED, n);
        }
        if let Some(n) = big.to_negative_argument() {
            return self.write_type_value(MAJOR_NEGATIVE, n);
        }
        let (tag, payload) = big.to_tag_payload();
        self.write_tag(tag)?;
        self.write_bytes(MAJOR_BYTES, &payload)
    }
}

/// Sequence and map state for the serde path.
pub struct Compound<'a, W: Write> {
    enc: &'a mut Encoder<W>,
    indefinite: bool,
}

impl<W: Write> Compound<'_, W> {
    fn finish(self) -> Result<()> {
        if self.indefinite {
            self.enc.write_break()?;
        }
        Ok(())
    }
}

impl<'a, W: Write> serde::Serializer for &'a mut Encoder<W> {
    type Ok = ();
    type Error = CborError;
    type SerializeSeq = Compound<'a, W>;
    type SerializeTuple = Compound<'a, W>;
    type SerializeTupleStruct = Compound<'a, W>;
    type SerializeTupleVariant = Compound<'a, W>;
    type SerializeMap = Compound<'a, W>;
    type SerializeStruct = Compound<'a, W>;
    type SerializeStructVariant = Compound<'a, W>;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.write_simple(if v { SIMPLE_TRUE } else { SIMPLE_FALSE })
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        if v >= 0 {
            self.write_type_value(MAJOR_UNSIGNED, v as u64)
        } else {
            self.write_type_value(MAJOR_NEGATIVE, (-1 - v) as u64)
        }
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        self.write_bigint(&BigInt::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        if self.tagging == TagState::AwaitingNumber {
            self.tagging = TagState::Idle;
            return self.write_tag(v);
        }
        self.write_type_value(MAJOR_UNSIGNED, v)
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        self.write_bigint(&BigInt::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        write_float(&mut self.writer, v as f64)?;
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        write_float(&mut self.writer, v)?;
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.write_bytes(MAJOR_TEXT, v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.write_bytes(MAJOR_BYTES, v)
    }

    fn serialize_none(self) -> Result<()> {
        self.write_simple(SIMPLE_NULL)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.serialize_none()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<()> {
        if name == TAGGED_TOKEN {
            self.tagging = TagState::AwaitingPair;
        }
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.write_type_value(MAJOR_MAP, 1)?;
        variant.serialize(&mut *self)?;
        value.serialize(self)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Compound<'a, W>> {
        match len {
            Some(len) => self.write_type_value(MAJOR_ARRAY, len as u64)?,
            None => self.begin_indefinite(MAJOR_ARRAY)?,
        }
        Ok(Compound {
            enc: self,
            indefinite: len.is_none(),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Compound<'a, W>> {
        if self.tagging == TagState::AwaitingPair && len == 2 {
            // the pair itself is not written, only the tag head and the content
            self.tagging = TagState::AwaitingNumber;
            return Ok(Compound {
                enc: self,
                indefinite: false,
            });
        }
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Compound<'a, W>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Compound<'a, W>> {
        self.write_type_value(MAJOR_MAP, 1)?;
        variant.serialize(&mut *self)?;
        self.serialize_seq(Some(len))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Compound<'a, W>> {
        match len {
            Some(len) => self.write_type_value(MAJOR_MAP, len as u64)?,
            None => self.begin_indefinite(MAJOR_MAP)?,
        }
        Ok(Compound {
            enc: self,
            indefinite: len.is_none(),
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Compound<'a, W>> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Compound<'a, W>> {
        self.write_type_value(MAJOR_MAP, 1)?;
        variant.serialize(&mut *self)?;
        self.serialize_map(Some(len))
    }
}

impl<W: Write> serde::ser::SerializeSeq for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl<W: Write> serde::ser::SerializeTuple for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl<W: Write> serde::ser::SerializeTupleStruct for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl<W: Write> serde::ser::SerializeTupleVariant for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl<W: Write> serde::ser::SerializeMap for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        key.serialize(&mut *self.enc)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl<W: Write> serde::ser::SerializeStruct for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        key.serialize(&mut *self.enc)?;
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}

impl<W: Write> serde::ser::SerializeStructVariant for Compound<'_, W> {
    type Ok = ();
    type Error = CborError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        key.serialize(&mut *self.enc)?;
        value.serialize(&mut *self.enc)
    }

    fn end(self) -> Result<()> {
        self.finish()
    }
}
