use std::borrow::Cow;
use std::str;

use serde::Deserialize;
use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use tracing::debug;

use crate::bignum::BigInt;
use crate::error::{CborError, FormatViolation, Result};
use crate::head::{self, Argument, BREAK, Head};
use crate::registry::TagRegistry;
use crate::tags::TAGGED_TOKEN;
use crate::value::Value;
use crate::{
    MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_SIMPLE, MAJOR_TAG, MAJOR_TEXT,
    MAJOR_UNSIGNED, SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE, SIMPLE_UNDEFINED,
    TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM,
};

pub(crate) const DEFAULT_MAX_DEPTH: usize = 256;
const NULL: u8 = (MAJOR_SIMPLE << 5) | SIMPLE_NULL;
const UNDEFINED: u8 = (MAJOR_SIMPLE << 5) | SIMPLE_UNDEFINED;

/// Resource bounds applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum nesting of arrays, maps and tags.
    pub max_depth: usize,
    /// Largest element, entry or byte count a head may declare.
    ///
    /// Declared lengths are always checked against the remaining input as well.
    pub max_declared_len: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits {
            max_depth: DEFAULT_MAX_DEPTH,
            max_declared_len: u64::MAX,
        }
    }
}

/// Cursor over a CBOR byte slice.
///
/// Produces [`Value`]s through [`Decoder::decode_value`] or any
/// `T: Deserialize` through [`Decoder::decode`]. Definite-length strings are
/// borrowed from the input when the target type allows it.
pub struct Decoder<'de> {
    input: &'de [u8],
    offset: usize,
    depth: usize,
    limits: DecodeLimits,
}

impl<'de> Decoder<'de> {
    pub fn new(input: &'de [u8]) -> Self {
        Self::with_limits(input, DecodeLimits::default())
    }

    pub fn with_limits(input: &'de [u8], limits: DecodeLimits) -> Self {
        Decoder {
            input,
            offset: 0,
            depth: 0,
            limits,
        }
    }

    /// A decoder that starts reading at `offset` instead of the start of `input`.
    pub(crate) fn at(input: &'de [u8], offset: usize, limits: DecodeLimits) -> Self {
        Decoder {
            offset,
            ..Self::with_limits(input, limits)
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.offset
    }

    fn read_head(&mut self) -> Result<Head> {
        let (head, next) = head::read_head(self.input, self.offset)?;
        self.offset = next;
        Ok(head)
    }

    fn peek_major(&self) -> Option<u8> {
        self.input.get(self.offset).map(|initial| initial >> 5)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.offset).copied()
    }

    /// Consumes a break marker if one is next.
    fn consume_break(&mut self) -> bool {
        if self.peek_byte() == Some(BREAK) {
            self.offset += 1;
            true
        } else {
            false
        }
    }

    /// Reads a tag head and returns its number. The tag content is left unread.
    pub fn read_tag(&mut self) -> Result<u64> {
        let start = self.offset;
        let head = self.read_head()?;
        if head.major != MAJOR_TAG {
            return Err(CborError::format(
                start,
                FormatViolation::UnexpectedType {
                    expected: MAJOR_TAG,
                    found: head.major,
                },
            ));
        }
        argument(head, start)
    }

    pub fn decode<T: Deserialize<'de>>(&mut self) -> Result<T> {
        T::deserialize(self)
    }

    /// Validates a declared count of items, each at least `min_item_size` bytes long.
    fn declared_len(&self, len: u64, min_item_size: usize) -> Result<usize> {
        if len > self.limits.max_declared_len {
            debug!(len, limit = self.limits.max_declared_len, "declared length rejected");
            return Err(CborError::format(
                self.offset,
                FormatViolation::LengthLimitExceeded(len),
            ));
        }
        let remaining = self.input.len().saturating_sub(self.offset);
        let needed = usize::try_from(len)
            .ok()
            .and_then(|len| len.checked_mul(min_item_size))
            .unwrap_or(usize::MAX);
        if needed > remaining {
            return Err(CborError::Truncated {
                offset: self.input.len(),
                needed: needed - remaining,
            });
        }
        Ok(len as usize)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            debug!(max_depth = self.limits.max_depth, offset = self.offset, "nesting too deep");
            return Err(CborError::format(
                self.offset,
                FormatViolation::DepthLimitExceeded(self.limits.max_depth),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn read_slice(&mut self, len: u64) -> Result<&'de [u8]> {
        let len = self.declared_len(len, 1)?;
        let bytes = head::take(self.input, self.offset, len)?;
        self.offset += len;
        Ok(bytes)
    }

    /// Reads a byte or text string, joining the chunks of an indefinite-length one.
    fn read_string(&mut self, head: Head) -> Result<Cow<'de, [u8]>> {
        if let Argument::Uint(len) = head.argument {
            let data_start = self.offset;
            let bytes = self.read_slice(len)?;
            check_utf8(head.major, bytes, data_start)?;
            return Ok(Cow::Borrowed(bytes));
        }
        let mut joined = Vec::new();
        while let Some(bytes) = self.next_chunk(head.major)? {
            check_utf8(head.major, bytes, self.offset - bytes.len())?;
            joined.extend_from_slice(bytes);
        }
        Ok(Cow::Owned(joined))
    }

    /// Reads the next chunk of an indefinite-length string, or `None` at its break.
    fn next_chunk(&mut self, major: u8) -> Result<Option<&'de [u8]>> {
        let chunk_start = self.offset;
        let chunk = self.read_head()?;
        if chunk.is_break() {
            return Ok(None);
        }
        if chunk.major != major {
            return Err(CborError::format(
                chunk_start,
                FormatViolation::MismatchedChunk {
                    expected: major,
                    found: chunk.major,
                },
            ));
        }
        let Argument::Uint(len) = chunk.argument else {
            return Err(CborError::format(
                chunk_start,
                FormatViolation::NestedIndefiniteChunk,
            ));
        };
        self.read_slice(len).map(Some)
    }

    fn read_text(&mut self, head: Head, start: usize) -> Result<Cow<'de, str>> {
        match self.read_string(head)? {
            Cow::Borrowed(bytes) => str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| CborError::InvalidUtf8 { offset: start }),
            Cow::Owned(bytes) => String::from_utf8(bytes)
                .map(Cow::Owned)
                .map_err(|_| CborError::InvalidUtf8 { offset: start }),
        }
    }

    /// Decodes one complete data item.
    pub fn decode_value(&mut self, registry: &TagRegistry) -> Result<Value> {
        let start = self.offset;
        self.next_item(registry)?
            .ok_or_else(|| CborError::format(start, FormatViolation::UnexpectedBreak))
    }

    /// Decodes one data item, or returns `None` if a break marker is next.
    fn next_item(&mut self, registry: &TagRegistry) -> Result<Option<Value>> {
        let start = self.offset;
        let head = self.read_head()?;
        if head.is_break() {
            return Ok(None);
        }
        let value = match head.major {
            MAJOR_UNSIGNED => Value::Unsigned(argument(head, start)?),
            MAJOR_NEGATIVE => Value::Negative(argument(head, start)?),
            MAJOR_BYTES => Value::Bytes(self.read_string(head)?.into_owned()),
            MAJOR_TEXT => Value::Text(self.read_text(head, start)?.into_owned()),
            MAJOR_ARRAY => {
                self.enter()?;
                let items = match head.argument {
                    Argument::Uint(len) => {
                        let len = self.declared_len(len, 1)?;
                        let mut items = Vec::with_capacity(len);
                        for _ in 0..len {
                            items.push(self.decode_value(registry)?);
                        }
                        items
                    }
                    _ => {
                        let mut items = Vec::new();
                        while let Some(item) = self.next_item(registry)? {
                            items.push(item);
                        }
                        items
                    }
                };
                self.leave();
                Value::Array(items)
            }
            MAJOR_MAP => {
                self.enter()?;
                let entries = match head.argument {
                    Argument::Uint(len) => {
                        let len = self.declared_len(len, 2)?;
                        let mut entries = Vec::with_capacity(len);
                        for _ in 0..len {
                            let key = self.decode_value(registry)?;
                            let value = self.decode_value(registry)?;
                            entries.push((key, value));
                        }
                        entries
                    }
                    _ => {
                        let mut entries = Vec::new();
                        while let Some(key) = self.next_item(registry)? {
                            let value = self.decode_value(registry)?;
                            entries.push((key, value));
                        }
                        entries
                    }
                };
                self.leave();
                Value::Map(entries)
            }
            MAJOR_TAG => {
                let tag = argument(head, start)?;
                self.enter()?;
                let payload = self.decode_value(registry)?;
                self.leave();
                registry
                    .decode_tag(tag, payload)
                    .map_err(|violation| CborError::format(start, violation))?
            }
            _ => match head.argument {
                Argument::Float(f) => Value::Float(f),
                Argument::Uint(code) => match simple(head, code, start)? {
                    SIMPLE_FALSE => Value::Bool(false),
                    SIMPLE_TRUE => Value::Bool(true),
                    SIMPLE_NULL => Value::Null,
                    SIMPLE_UNDEFINED => Value::Undefined,
                    code => Value::Simple(code),
                },
                Argument::Indefinite => {
                    return Err(CborError::format(start, FormatViolation::UnexpectedBreak));
                }
            },
        };
        Ok(Some(value))
    }

    /// Skips one complete data item without building it.
    ///
    /// Heads, declared lengths, tags, chunks and break markers are checked the
    /// way [`Decoder::decode_value`] checks them, and the same limits apply.
    /// Text content is not checked for valid UTF-8 and tag payloads are not
    /// run through any registry.
    pub fn skip(&mut self) -> Result<()> {
        let mut open: Vec<Open> = Vec::new();
        loop {
            let start = self.offset;
            let head = self.read_head()?;
            if head.is_break() {
                // a map closed between a key and its value is malformed too
                match open.pop() {
                    Some(Open::Indefinite { pairs, items }) if !pairs || items % 2 == 0 => {}
                    _ => {
                        return Err(CborError::format(start, FormatViolation::UnexpectedBreak));
                    }
                }
            } else {
                match head.major {
                    MAJOR_UNSIGNED | MAJOR_NEGATIVE => {
                        argument(head, start)?;
                    }
                    MAJOR_BYTES | MAJOR_TEXT => match head.argument {
                        Argument::Uint(len) => {
                            self.read_slice(len)?;
                        }
                        _ => {
                            while self.next_chunk(head.major)?.is_some() {}
                        }
                    },
                    MAJOR_ARRAY | MAJOR_MAP | MAJOR_TAG => {
                        if self.depth + open.len() >= self.limits.max_depth {
                            debug!(
                                max_depth = self.limits.max_depth,
                                offset = start,
                                "nesting too deep"
                            );
                            return Err(CborError::format(
                                self.offset,
                                FormatViolation::DepthLimitExceeded(self.limits.max_depth),
                            ));
                        }
                        let container = match (head.major, head.argument) {
                            (MAJOR_TAG, _) => Open::Items(argument(head, start).map(|_| 1)?),
                            (MAJOR_ARRAY, Argument::Uint(len)) => {
                                Open::Items(self.declared_len(len, 1)? as u64)
                            }
                            (_, Argument::Uint(len)) => {
                                Open::Items(self.declared_len(len, 2)? as u64 * 2)
                            }
                            (major, _) => Open::Indefinite {
                                pairs: major == MAJOR_MAP,
                                items: 0,
                            },
                        };
                        if container != Open::Items(0) {
                            open.push(container);
                            continue;
                        }
                    }
                    _ => {
                        if let Argument::Uint(code) = head.argument {
                            simple(head, code, start)?;
                        }
                    }
                }
            }

            // one item is complete; count it against the containers around it
            loop {
                match open.last_mut() {
                    None => return Ok(()),
                    Some(Open::Items(left)) => {
                        *left -= 1;
                        if *left > 0 {
                            break;
                        }
                        open.pop();
                    }
                    Some(Open::Indefinite { items, .. }) => {
                        *items += 1;
                        break;
                    }
                }
            }
        }
    }

    /// Reads the byte string payload of tag 2 or 3 for the serde path.
    fn read_bignum(&mut self, tag: u64) -> Result<BigInt> {
        let payload_start = self.offset;
        let head = self.read_head()?;
        if head.major != MAJOR_BYTES {
            return Err(CborError::format(
                payload_start,
                FormatViolation::BignumPayload(tag),
            ));
        }
        let payload = self.read_string(head)?;
        Ok(BigInt::from_tag_payload(tag == TAG_NEGATIVE_BIGNUM, &payload))
    }
}

/// A container [`Decoder::skip`] has entered but not yet finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    /// Items still expected: elements, keys plus values, or one tag payload.
    Items(u64),
    /// Open until a break; `items` is how many have been seen.
    Indefinite { pairs: bool, items: u64 },
}

/// The definite argument of a non-simple head.
pub(crate) fn argument(head: Head, start: usize) -> Result<u64> {
    match head.argument {
        Argument::Uint(n) => Ok(n),
        _ => Err(CborError::format(
            start,
            FormatViolation::InvalidIndefinite(head.major),
        )),
    }
}

/// Validates a simple value code. One-byte extensions below 32 are not well-formed.
pub(crate) fn simple(head: Head, code: u64, start: usize) -> Result<u8> {
    if head.info == head::ONE_BYTE && code < 32 {
        return Err(CborError::format(
            start,
            FormatViolation::InvalidSimpleValue(code as u8),
        ));
    }
    Ok(code as u8)
}

fn check_utf8(major: u8, bytes: &[u8], offset: usize) -> Result<()> {
    if major == MAJOR_TEXT {
        str::from_utf8(bytes).map_err(|e| CborError::InvalidUtf8 {
            offset: offset + e.valid_up_to(),
        })?;
    }
    Ok(())
}

fn visit_bigint<'de, V: Visitor<'de>>(big: BigInt, visitor: V) -> Result<V::Value> {
    if let Some(n) = big.to_u64() {
        visitor.visit_u64(n)
    } else if let Some(n) = big.to_i128().and_then(|n| i64::try_from(n).ok()) {
        visitor.visit_i64(n)
    } else if let Some(n) = big.to_u128() {
        visitor.visit_u128(n)
    } else if let Some(n) = big.to_i128() {
        visitor.visit_i128(n)
    } else {
        Err(CborError::UnsupportedOverflow {
            bytes: big.magnitude().len(),
        })
    }
}

impl<'de> de::Deserializer<'de> for &mut Decoder<'de> {
    type Error = CborError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let start = self.offset;
        let head = self.read_head()?;
        match head.major {
            MAJOR_UNSIGNED => visitor.visit_u64(argument(head, start)?),
            MAJOR_NEGATIVE => {
                let n = argument(head, start)?;
                match i64::try_from(n) {
                    Ok(n) => visitor.visit_i64(-1 - n),
                    Err(_) => visitor.visit_i128(-1 - n as i128),
                }
            }
            MAJOR_BYTES => match self.read_string(head)? {
                Cow::Borrowed(bytes) => visitor.visit_borrowed_bytes(bytes),
                Cow::Owned(bytes) => visitor.visit_byte_buf(bytes),
            },
            MAJOR_TEXT => match self.read_text(head, start)? {
                Cow::Borrowed(s) => visitor.visit_borrowed_str(s),
                Cow::Owned(s) => visitor.visit_string(s),
            },
            MAJOR_ARRAY => {
                let remaining = match head.argument {
                    Argument::Uint(len) => Some(self.declared_len(len, 1)?),
                    _ => None,
                };
                self.enter()?;
                let mut access = SeqAccess {
                    de: &mut *self,
                    remaining,
                };
                let value = visitor.visit_seq(&mut access)?;
                access.end()?;
                self.leave();
                Ok(value)
            }
            MAJOR_MAP => {
                let remaining = match head.argument {
                    Argument::Uint(len) => Some(self.declared_len(len, 2)?),
                    _ => None,
                };
                self.enter()?;
                let mut access = MapAccess {
                    de: &mut *self,
                    remaining,
                };
                let value = visitor.visit_map(&mut access)?;
                access.end()?;
                self.leave();
                Ok(value)
            }
            MAJOR_TAG => {
                let tag = argument(head, start)?;
                self.enter()?;
                let value = match tag {
                    TAG_POSITIVE_BIGNUM | TAG_NEGATIVE_BIGNUM => {
                        let big = self.read_bignum(tag)?;
                        visit_bigint(big, visitor)
                    }
                    _ => de::Deserializer::deserialize_any(&mut *self, visitor),
                }?;
                self.leave();
                Ok(value)
            }
            _ => match head.argument {
                Argument::Float(f) => visitor.visit_f64(f),
                Argument::Uint(code) => match simple(head, code, start)? {
                    SIMPLE_FALSE => visitor.visit_bool(false),
                    SIMPLE_TRUE => visitor.visit_bool(true),
                    SIMPLE_NULL => visitor.visit_none(),
                    SIMPLE_UNDEFINED => visitor.visit_unit(),
                    code => Err(CborError::Serde(format!(
                        "simple value {code} has no serde representation"
                    ))),
                },
                Argument::Indefinite => Err(CborError::format(
                    start,
                    FormatViolation::UnexpectedBreak,
                )),
            },
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.peek_byte() {
            Some(NULL | UNDEFINED) => {
                self.offset += 1;
                visitor.visit_none()
            }
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.peek_byte() {
            Some(NULL | UNDEFINED) => {
                self.offset += 1;
                visitor.visit_unit()
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name != TAGGED_TOKEN {
            return visitor.visit_newtype_struct(self);
        }
        let tag = if self.peek_major() == Some(MAJOR_TAG) {
            Some(self.read_tag()?)
        } else {
            None
        };
        self.enter()?;
        let value = visitor.visit_map(TaggedAccess {
            de: &mut *self,
            tag,
            field: 0,
        })?;
        self.leave();
        Ok(value)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let start = self.offset;
        match self.peek_major() {
            Some(MAJOR_TEXT) => {
                let head = self.read_head()?;
                let variant = self.read_text(head, start)?;
                visitor.visit_enum(variant.as_ref().into_deserializer())
            }
            Some(MAJOR_MAP) => {
                let head = self.read_head()?;
                if head.argument != Argument::Uint(1) {
                    return Err(CborError::Serde(
                        "enum variant must be a text string or a one-entry map".to_string(),
                    ));
                }
                self.enter()?;
                let value = visitor.visit_enum(VariantAccess { de: &mut *self })?;
                self.leave();
                Ok(value)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.skip()?;
        visitor.visit_unit()
    }

    fn is_human_readable(&self) -> bool {
        false
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf seq tuple tuple_struct map struct identifier
    }
}

struct SeqAccess<'a, 'de> {
    de: &'a mut Decoder<'de>,
    /// `None` while an indefinite-length array is still open.
    remaining: Option<usize>,
}

impl SeqAccess<'_, '_> {
    fn end(self) -> Result<()> {
        match self.remaining {
            Some(0) => Ok(()),
            Some(n) => Err(CborError::Serde(format!("{n} unread array element(s)"))),
            None if self.de.consume_break() => Ok(()),
            None => Err(CborError::Serde(
                "unread elements in indefinite-length array".to_string(),
            )),
        }
    }
}

impl<'de> de::SeqAccess<'de> for SeqAccess<'_, 'de> {
    type Error = CborError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => {
                if self.de.consume_break() {
                    self.remaining = Some(0);
                    return Ok(None);
                }
            }
        }
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        self.remaining
    }
}

struct MapAccess<'a, 'de> {
    de: &'a mut Decoder<'de>,
    remaining: Option<usize>,
}

impl MapAccess<'_, '_> {
    fn end(self) -> Result<()> {
        match self.remaining {
            Some(0) => Ok(()),
            Some(n) => Err(CborError::Serde(format!("{n} unread map entries"))),
            None if self.de.consume_break() => Ok(()),
            None => Err(CborError::Serde(
                "unread entries in indefinite-length map".to_string(),
            )),
        }
    }
}

impl<'de> de::MapAccess<'de> for MapAccess<'_, 'de> {
    type Error = CborError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => {
                if self.de.consume_break() {
                    self.remaining = Some(0);
                    return Ok(None);
                }
            }
        }
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        if self.remaining.is_none() && self.de.peek_byte() == Some(BREAK) {
            return Err(CborError::format(
                self.de.offset,
                FormatViolation::UnexpectedBreak,
            ));
        }
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        self.remaining
    }
}

/// Presents a tag as the map `{tag: Option<u64>, value: T}` to [`Tagged`](crate::Tagged).
struct TaggedAccess<'a, 'de> {
    de: &'a mut Decoder<'de>,
    tag: Option<u64>,
    field: u8,
}

impl<'de> de::MapAccess<'de> for TaggedAccess<'_, 'de> {
    type Error = CborError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let key = match self.field {
            0 => "tag",
            1 => "value",
            _ => return Ok(None),
        };
        seed.deserialize(key.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        self.field += 1;
        if self.field == 1 {
            seed.deserialize(TagNumber(self.tag))
        } else {
            seed.deserialize(&mut *self.de)
        }
    }
}

/// Deserializer for the optional tag number of a [`Tagged`](crate::Tagged) value.
struct TagNumber(Option<u64>);

impl<'de> de::Deserializer<'de> for TagNumber {
    type Error = CborError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.0 {
            Some(tag) => visitor.visit_u64(tag),
            None => visitor.visit_none(),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.0 {
            Some(tag) => visitor.visit_some(tag.into_deserializer()),
            None => visitor.visit_none(),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

/// Enum access for the one-entry map form `{variant: content}`.
struct VariantAccess<'a, 'de> {
    de: &'a mut Decoder<'de>,
}

impl<'de, 'a> de::EnumAccess<'de> for VariantAccess<'a, 'de> {
    type Error = CborError;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self)> {
        let variant = seed.deserialize(&mut *self.de)?;
        Ok((variant, self))
    }
}

impl<'de> de::VariantAccess<'de> for VariantAccess<'_, 'de> {
    type Error = CborError;

    fn unit_variant(self) -> Result<()> {
        de::IgnoredAny::deserialize(&mut *self.de).map(|_| ())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(&mut *self.de)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_any(&mut *self.de, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_any(&mut *self.de, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_hex(input: &str) -> Result<Value> {
        let bytes = hex::decode(input).unwrap();
        Decoder::new(&bytes).decode_value(TagRegistry::standard())
    }

    #[test]
    fn test_concrete_vectors() {
        assert_eq!(decode_hex("00").unwrap(), Value::Unsigned(0));
        assert_eq!(decode_hex("17").unwrap(), Value::Unsigned(23));
        assert_eq!(decode_hex("1818").unwrap(), Value::Unsigned(24));
        assert_eq!(decode_hex("20").unwrap(), Value::from(-1i64));
        assert_eq!(decode_hex("6161").unwrap(), Value::from("a"));
        assert_eq!(decode_hex("80").unwrap(), Value::Array(vec![]));
        assert_eq!(decode_hex("a0").unwrap(), Value::Map(vec![]));
        assert_eq!(
            decode_hex("c249010000000000000000").unwrap(),
            Value::integer(1i128 << 64)
        );
    }

    #[test]
    fn test_indefinite_strings() {
        assert_eq!(
            decode_hex("5f42010243030405ff").unwrap(),
            Value::Bytes(vec![1, 2, 3, 4, 5])
        );
        assert_eq!(
            decode_hex("7f657374726561646d696e67ff").unwrap(),
            Value::from("streaming")
        );
        assert_eq!(decode_hex("7fff").unwrap(), Value::from(""));
    }

    #[test]
    fn test_indefinite_string_chunk_errors() {
        let err = decode_hex("5f6161ff").unwrap_err();
        assert_eq!(
            err.violation(),
            Some(FormatViolation::MismatchedChunk {
                expected: MAJOR_BYTES,
                found: MAJOR_TEXT
            })
        );

        let err = decode_hex("7f7f6161ffff").unwrap_err();
        assert_eq!(err.violation(), Some(FormatViolation::NestedIndefiniteChunk));
    }

    #[test]
    fn test_break_errors() {
        assert_eq!(
            decode_hex("ff").unwrap_err().violation(),
            Some(FormatViolation::UnexpectedBreak)
        );
        // break in a definite array
        assert_eq!(
            decode_hex("8201ff").unwrap_err().violation(),
            Some(FormatViolation::UnexpectedBreak)
        );
        // break where a map value should be
        assert_eq!(
            decode_hex("bf01ff").unwrap_err().violation(),
            Some(FormatViolation::UnexpectedBreak)
        );
    }

    #[test]
    fn test_invalid_indefinite_major_types() {
        for (input, major) in [("1f", 0), ("3f", 1), ("df", 6)] {
            assert_eq!(
                decode_hex(input).unwrap_err().violation(),
                Some(FormatViolation::InvalidIndefinite(major))
            );
        }
    }

    #[test]
    fn test_simple_values() {
        assert_eq!(decode_hex("f4").unwrap(), Value::Bool(false));
        assert_eq!(decode_hex("f7").unwrap(), Value::Undefined);
        assert_eq!(decode_hex("f0").unwrap(), Value::Simple(16));
        assert_eq!(decode_hex("f8ff").unwrap(), Value::Simple(255));
        assert_eq!(
            decode_hex("f818").unwrap_err().violation(),
            Some(FormatViolation::InvalidSimpleValue(24))
        );
    }

    #[test]
    fn test_declared_length_capped_by_input() {
        // array claiming 2^32 elements with none present
        let err = decode_hex("9b0000000100000000").unwrap_err();
        assert!(err.is_truncated());

        let err = decode_hex("5a0000ffff00").unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_declared_length_limit() {
        let limits = DecodeLimits {
            max_declared_len: 2,
            ..DecodeLimits::default()
        };
        let bytes = hex::decode("83010203").unwrap();
        let err = Decoder::with_limits(&bytes, limits)
            .decode_value(TagRegistry::standard())
            .unwrap_err();
        assert_eq!(err.violation(), Some(FormatViolation::LengthLimitExceeded(3)));
    }

    #[test]
    fn test_depth_limit() {
        let limits = DecodeLimits {
            max_depth: 3,
            ..DecodeLimits::default()
        };
        let ok = hex::decode("81818100").unwrap();
        Decoder::with_limits(&ok, limits)
            .decode_value(TagRegistry::standard())
            .unwrap();

        let deep = hex::decode("8181818100").unwrap();
        let err = Decoder::with_limits(&deep, limits)
            .decode_value(TagRegistry::standard())
            .unwrap_err();
        assert_eq!(err.violation(), Some(FormatViolation::DepthLimitExceeded(3)));

        // tags count towards the depth too
        let tags = hex::decode("c6c6c6c600").unwrap();
        let err = Decoder::with_limits(&tags, limits)
            .decode_value(TagRegistry::standard())
            .unwrap_err();
        assert_eq!(err.violation(), Some(FormatViolation::DepthLimitExceeded(3)));
    }

    #[test]
    fn test_invalid_utf8_offset() {
        let err = decode_hex("6361ff62").unwrap_err();
        assert!(matches!(err, CborError::InvalidUtf8 { offset: 2 }));
    }

    #[test]
    fn test_tag_errors_point_at_tag() {
        let err = decode_hex("c26161").unwrap_err();
        match err {
            CborError::Format { offset, violation } => {
                assert_eq!(offset, 0);
                assert_eq!(violation, FormatViolation::BignumPayload(2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_read_tag() {
        let bytes = hex::decode("d82a6474657374").unwrap();
        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.read_tag().unwrap(), 42);
        let content: &str = decoder.decode().unwrap();
        assert_eq!(content, "test");
        assert_eq!(decoder.position(), bytes.len());

        let mut decoder = Decoder::new(&[0x01]);
        let err = decoder.read_tag().unwrap_err();
        assert_eq!(
            err.violation(),
            Some(FormatViolation::UnexpectedType {
                expected: MAJOR_TAG,
                found: MAJOR_UNSIGNED
            })
        );
    }

    #[test]
    fn test_serde_borrows_definite_strings() {
        let bytes = hex::decode("826568656c6c6f43010203").unwrap();
        let (text, raw): (&str, &[u8]) = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(text, "hello");
        assert_eq!(raw, &[1, 2, 3]);
    }

    #[test]
    fn test_serde_indefinite_containers() {
        let bytes = hex::decode("9f018202039f0405ffff").unwrap();
        let decoded: (u8, Vec<u8>, Vec<u8>) = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(decoded, (1, vec![2, 3], vec![4, 5]));

        let bytes = hex::decode("bf61610161620fff").unwrap();
        let decoded: std::collections::BTreeMap<String, u8> = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(decoded.get("a"), Some(&1));
        assert_eq!(decoded.get("b"), Some(&15));
    }

    #[test]
    fn test_serde_bignums() {
        let bytes = hex::decode("c249010000000000000000").unwrap();
        let n: u128 = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(n, 1u128 << 64);

        let bytes = hex::decode("3bffffffffffffffff").unwrap();
        let n: i128 = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(n, -(1i128 << 64));

        // 17 byte magnitude
        let mut big = vec![0xc2, 0x51];
        big.extend_from_slice(&[0xff; 17]);
        let err = Decoder::new(&big).decode::<u128>().unwrap_err();
        assert!(matches!(err, CborError::UnsupportedOverflow { bytes: 17 }));
    }

    #[test]
    fn test_serde_unknown_tag_passes_through() {
        let bytes = hex::decode("d9ffff6161").unwrap();
        let s: String = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(s, "a");
    }

    #[test]
    fn test_serde_undefined_is_unit() {
        let option: Option<u8> = Decoder::new(&[0xf7]).decode().unwrap();
        assert_eq!(option, None);
        let unit: () = Decoder::new(&[0xf6]).decode().unwrap();
        assert_eq!(unit, ());
    }

    #[test]
    fn test_skip_moves_past_one_item() {
        let cases = [
            ("00", 1),
            ("1bffffffffffffffff", 9),
            ("6161", 2),
            ("5f42010243030405ff", 9),
            ("80", 1),
            ("a0", 1),
            ("8301820203820405", 8),
            ("9f018202039f0405ffff", 10),
            ("bf61610161629f0203ffff", 11),
            ("c249010000000000000000", 11),
            ("d9d9f7a0", 4),
            ("f0", 1),
            ("fb3ff199999999999a", 9),
        ];
        for (input, len) in cases {
            let mut bytes = hex::decode(input).unwrap();
            bytes.push(0x07);
            let mut decoder = Decoder::new(&bytes);
            decoder.skip().unwrap();
            assert_eq!(decoder.position(), len, "{input}");
            assert_eq!(decoder.decode::<u8>().unwrap(), 7);
        }
    }

    #[test]
    fn test_skip_rejects_malformed_items() {
        let cases = [
            ("ff", FormatViolation::UnexpectedBreak),
            ("8201ff", FormatViolation::UnexpectedBreak),
            ("bf01ff", FormatViolation::UnexpectedBreak),
            ("1f", FormatViolation::InvalidIndefinite(0)),
            ("df00", FormatViolation::InvalidIndefinite(6)),
            ("f818", FormatViolation::InvalidSimpleValue(24)),
            ("1c", FormatViolation::ReservedAdditionalInfo(28)),
            ("7f7f6161ffff", FormatViolation::NestedIndefiniteChunk),
            (
                "5f6161ff",
                FormatViolation::MismatchedChunk {
                    expected: MAJOR_BYTES,
                    found: MAJOR_TEXT,
                },
            ),
        ];
        for (input, violation) in cases {
            let bytes = hex::decode(input).unwrap();
            let err = Decoder::new(&bytes).skip().unwrap_err();
            assert_eq!(err.violation(), Some(violation), "{input}");
        }

        let bytes = hex::decode("9f018202039f0405ffff").unwrap();
        for end in 0..bytes.len() {
            let err = Decoder::new(&bytes[..end]).skip().unwrap_err();
            assert!(err.is_truncated(), "prefix of {end} bytes: {err:?}");
        }
    }

    #[test]
    fn test_skip_applies_limits() {
        let limits = DecodeLimits {
            max_depth: 3,
            max_declared_len: 2,
        };
        let ok = hex::decode("81818100").unwrap();
        Decoder::with_limits(&ok, limits).skip().unwrap();

        for deep in ["8181818100", "c6c6c6c600"] {
            let bytes = hex::decode(deep).unwrap();
            let err = Decoder::with_limits(&bytes, limits).skip().unwrap_err();
            assert_eq!(err.violation(), Some(FormatViolation::DepthLimitExceeded(3)));
        }

        let bytes = hex::decode("83010203").unwrap();
        let err = Decoder::with_limits(&bytes, limits).skip().unwrap_err();
        assert_eq!(err.violation(), Some(FormatViolation::LengthLimitExceeded(3)));
    }

    #[test]
    fn test_serde_trailing_array_elements() {
        let bytes = hex::decode("83010203").unwrap();
        let err = Decoder::new(&bytes).decode::<(u8, u8)>().unwrap_err();
        assert!(matches!(err, CborError::Serde(_)));
    }
}
