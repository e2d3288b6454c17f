//! Lazy, zero-copy traversal of encoded CBOR.
//!
//! A [`Walker`] points at one data item inside a byte slice and never builds
//! values or allocates. [`Walker::next`] steps over the whole item, nested
//! containers, chunked strings and tags included. [`Walker::enter`] steps into
//! an array, map, tag or chunked string. Accessors read the current head in
//! place and fail with [`CborError::WrongKind`] on an item of another kind.
//!
//! A walker made with [`Walker::tagged`] steps over tag heads by itself and
//! keeps them queryable through [`Walker::tag_count`] and [`Walker::tag`].
//!
//! ```rust
//! use tagged_cbor::Walker;
//!
//! // {"a": 1, "b": [2, 3]}
//! let bytes = [0xa2, 0x61, 0x61, 0x01, 0x61, 0x62, 0x82, 0x02, 0x03];
//! let mut sum = 0;
//! let after = Walker::new(&bytes)
//!     .for_each_pair(|key, value| {
//!         if key.as_str().unwrap() == "b" {
//!             value.for_each(|item, _| sum += item.as_u64().unwrap()).unwrap();
//!         }
//!     })
//!     .unwrap();
//! assert_eq!(sum, 5);
//! assert!(after.at_end());
//! ```

use std::str;

use serde::Deserialize;

use crate::decode::{DecodeLimits, Decoder, argument, simple};
use crate::error::{CborError, FormatViolation, Result};
use crate::head::{self, Argument, BREAK, Head};
use crate::registry::TagRegistry;
use crate::value::Value;
use crate::{
    MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED,
    SIMPLE_FALSE, SIMPLE_NULL, SIMPLE_TRUE, SIMPLE_UNDEFINED,
};

/// The kind of data item a [`Walker`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Unsigned,
    Negative,
    Bytes,
    Text,
    Array,
    Map,
    Tag,
    /// Major type 7 values other than floats, booleans and null included.
    Simple,
    Float,
    /// The break marker closing an indefinite-length item.
    Break,
}

impl ItemKind {
    fn of(head: &Head) -> Self {
        match head.major {
            MAJOR_UNSIGNED => ItemKind::Unsigned,
            MAJOR_NEGATIVE => ItemKind::Negative,
            MAJOR_BYTES => ItemKind::Bytes,
            MAJOR_TEXT => ItemKind::Text,
            MAJOR_ARRAY => ItemKind::Array,
            MAJOR_MAP => ItemKind::Map,
            MAJOR_TAG => ItemKind::Tag,
            _ if head.is_break() => ItemKind::Break,
            _ => match head.argument {
                Argument::Float(_) => ItemKind::Float,
                _ => ItemKind::Simple,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemKind::Unsigned => "unsigned integer",
            ItemKind::Negative => "negative integer",
            ItemKind::Bytes => "byte string",
            ItemKind::Text => "text string",
            ItemKind::Array => "array",
            ItemKind::Map => "map",
            ItemKind::Tag => "tag",
            ItemKind::Simple => "simple value",
            ItemKind::Float => "float",
            ItemKind::Break => "break marker",
        }
    }
}

/// A position in encoded CBOR. Cheap to copy; moving returns a new walker.
#[derive(Debug, Clone, Copy)]
pub struct Walker<'de> {
    input: &'de [u8],
    offset: usize,
    /// Where the tags stepped over to reach `offset` begin.
    tags_start: usize,
    tag_count: usize,
    skip_tags: bool,
    limits: DecodeLimits,
}

impl<'de> Walker<'de> {
    /// A walker at the first item of `input` that reports tags as items.
    pub fn new(input: &'de [u8]) -> Self {
        Self::start(input, 0, false, DecodeLimits::default())
    }

    /// A walker at the first item of `input` that steps over tag heads.
    pub fn tagged(input: &'de [u8]) -> Self {
        Self::start(input, 0, true, DecodeLimits::default())
    }

    /// Bounds every item this walker and the walkers derived from it skip or decode.
    pub fn with_limits(self, limits: DecodeLimits) -> Self {
        Walker { limits, ..self }
    }

    fn start(input: &'de [u8], offset: usize, skip_tags: bool, limits: DecodeLimits) -> Self {
        let mut walker = Walker {
            input,
            offset,
            tags_start: offset,
            tag_count: 0,
            skip_tags,
            limits,
        };
        if skip_tags {
            while let Ok((head, next)) = head::read_head(input, walker.offset) {
                if head.major != MAJOR_TAG || !matches!(head.argument, Argument::Uint(_)) {
                    break;
                }
                walker.offset = next;
                walker.tag_count += 1;
            }
        }
        walker
    }

    fn at(&self, offset: usize) -> Self {
        Self::start(self.input, offset, self.skip_tags, self.limits)
    }

    /// Offset of the current item's head.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// The input from the current item onwards.
    pub fn remaining(&self) -> &'de [u8] {
        self.input.get(self.offset..).unwrap_or_default()
    }

    /// True once the walker has moved past the last byte of the input.
    pub fn at_end(&self) -> bool {
        self.offset >= self.input.len()
    }

    /// True at the break marker that closes an indefinite-length item.
    pub fn is_exit(&self) -> bool {
        self.input.get(self.offset) == Some(&BREAK)
    }

    fn head(&self) -> Result<(Head, usize)> {
        head::read_head(self.input, self.offset)
    }

    pub fn kind(&self) -> Result<ItemKind> {
        self.head().map(|(head, _)| ItemKind::of(&head))
    }

    fn wrong_kind(&self, expected: &'static str, found: &'static str) -> CborError {
        CborError::WrongKind {
            offset: self.offset,
            expected,
            found,
        }
    }

    /// Declared length: bytes of a string, items of an array, entries of a map.
    ///
    /// `None` for indefinite-length items.
    pub fn length(&self) -> Result<Option<u64>> {
        let (head, _) = self.head()?;
        match ItemKind::of(&head) {
            ItemKind::Bytes | ItemKind::Text | ItemKind::Array | ItemKind::Map => {
                Ok(match head.argument {
                    Argument::Uint(len) => Some(len),
                    _ => None,
                })
            }
            found => Err(self.wrong_kind("string, array or map", found.name())),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        let (head, _) = self.head()?;
        match ItemKind::of(&head) {
            ItemKind::Unsigned => argument(head, self.offset),
            found => Err(self.wrong_kind("unsigned integer", found.name())),
        }
    }

    /// Either integer major type; the full range of both fits an `i128`.
    pub fn as_i128(&self) -> Result<i128> {
        let (head, _) = self.head()?;
        match ItemKind::of(&head) {
            ItemKind::Unsigned => argument(head, self.offset).map(i128::from),
            ItemKind::Negative => argument(head, self.offset).map(|n| -1 - i128::from(n)),
            found => Err(self.wrong_kind("integer", found.name())),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        let (head, _) = self.head()?;
        match head.argument {
            Argument::Float(f) => Ok(f),
            _ => Err(self.wrong_kind("float", ItemKind::of(&head).name())),
        }
    }

    /// The code of a simple value.
    pub fn as_simple(&self) -> Result<u8> {
        let (head, _) = self.head()?;
        match (ItemKind::of(&head), head.argument) {
            (ItemKind::Simple, Argument::Uint(code)) => simple(head, code, self.offset),
            (found, _) => Err(self.wrong_kind("simple value", found.name())),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.as_simple()? {
            SIMPLE_FALSE => Ok(false),
            SIMPLE_TRUE => Ok(true),
            _ => Err(self.wrong_kind("boolean", ItemKind::Simple.name())),
        }
    }

    pub fn is_null(&self) -> bool {
        self.as_simple().ok() == Some(SIMPLE_NULL)
    }

    pub fn is_undefined(&self) -> bool {
        self.as_simple().ok() == Some(SIMPLE_UNDEFINED)
    }

    /// The number of the tag at the current position.
    pub fn as_tag(&self) -> Result<u64> {
        let (head, _) = self.head()?;
        match ItemKind::of(&head) {
            ItemKind::Tag => argument(head, self.offset),
            found => Err(self.wrong_kind("tag", found.name())),
        }
    }

    /// Content of a definite-length byte string, borrowed from the input.
    pub fn as_bytes(&self) -> Result<&'de [u8]> {
        self.definite_string(ItemKind::Bytes).map(|(bytes, _)| bytes)
    }

    /// Content of a definite-length text string, borrowed from the input.
    pub fn as_str(&self) -> Result<&'de str> {
        let (bytes, data_start) = self.definite_string(ItemKind::Text)?;
        str::from_utf8(bytes).map_err(|e| CborError::InvalidUtf8 {
            offset: data_start + e.valid_up_to(),
        })
    }

    fn definite_string(&self, kind: ItemKind) -> Result<(&'de [u8], usize)> {
        let (head, data_start) = self.head()?;
        let found = ItemKind::of(&head);
        if found != kind {
            return Err(self.wrong_kind(kind.name(), found.name()));
        }
        let Argument::Uint(len) = head.argument else {
            return Err(self.wrong_kind("definite-length string", "indefinite-length string"));
        };
        if len > self.limits.max_declared_len {
            return Err(CborError::format(
                self.offset,
                FormatViolation::LengthLimitExceeded(len),
            ));
        }
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        let bytes = head::take(self.input, data_start, len)?;
        Ok((bytes, data_start))
    }

    /// How many tags were stepped over to reach the current item.
    ///
    /// Always zero for walkers made with [`Walker::new`].
    pub fn tag_count(&self) -> usize {
        self.tag_count
    }

    /// The tag at `index` among those stepped over, outermost first.
    pub fn tag(&self, index: usize) -> Option<u64> {
        if index >= self.tag_count {
            return None;
        }
        let mut offset = self.tags_start;
        for _ in 0..index {
            offset = head::read_head(self.input, offset).ok()?.1;
        }
        match head::read_head(self.input, offset).ok()?.0.argument {
            Argument::Uint(tag) => Some(tag),
            _ => None,
        }
    }

    /// The walker for the item after this one.
    ///
    /// Steps over the whole item, including nested containers and tags. At a
    /// break marker it steps past the marker.
    pub fn next(&self) -> Result<Walker<'de>> {
        if self.is_exit() {
            return Ok(self.at(self.offset + 1));
        }
        let mut decoder = Decoder::at(self.input, self.offset, self.limits);
        decoder.skip()?;
        Ok(self.at(decoder.position()))
    }

    /// Steps over `count` items.
    pub fn advance(&self, count: usize) -> Result<Walker<'de>> {
        (0..count).try_fold(*self, |walker, _| walker.next())
    }

    /// The first item inside an array, map, tag or indefinite-length string.
    ///
    /// Other items have no inside, so for them this is [`Walker::next`].
    pub fn enter(&self) -> Result<Walker<'de>> {
        let (head, end) = self.head()?;
        match ItemKind::of(&head) {
            ItemKind::Array | ItemKind::Map => Ok(self.at(end)),
            ItemKind::Tag => argument(head, self.offset).map(|_| self.at(end)),
            ItemKind::Bytes | ItemKind::Text if head.argument == Argument::Indefinite => {
                Ok(self.at(end))
            }
            _ => self.next(),
        }
    }

    /// Steps over items up to the break marker that closes the enclosing
    /// indefinite-length item, then past the marker.
    pub fn next_exit(&self) -> Result<Walker<'de>> {
        let mut walker = *self;
        while !walker.is_exit() {
            walker = walker.next()?;
        }
        Ok(walker.at(walker.offset + 1))
    }

    /// Calls `visit` with each element of an array, each value of a map or
    /// each chunk of an indefinite-length string, along with its index.
    ///
    /// Returns the walker for the item after this one.
    pub fn for_each<F>(&self, mut visit: F) -> Result<Walker<'de>>
    where
        F: FnMut(Walker<'de>, usize),
    {
        self.entries(|_, item, index| visit(item, index))
    }

    /// Calls `visit` with each key and value of a map.
    ///
    /// Returns the walker for the item after the map.
    pub fn for_each_pair<F>(&self, mut visit: F) -> Result<Walker<'de>>
    where
        F: FnMut(Walker<'de>, Walker<'de>),
    {
        let kind = self.kind()?;
        if kind != ItemKind::Map {
            return Err(self.wrong_kind("map", kind.name()));
        }
        self.entries(|key, value, _| {
            if let Some(key) = key {
                visit(key, value);
            }
        })
    }

    fn entries<F>(&self, mut visit: F) -> Result<Walker<'de>>
    where
        F: FnMut(Option<Walker<'de>>, Walker<'de>, usize),
    {
        let (head, _) = self.head()?;
        let kind = ItemKind::of(&head);
        let count = match (kind, head.argument) {
            (ItemKind::Array | ItemKind::Map, Argument::Uint(len)) => Some(len),
            (
                ItemKind::Array | ItemKind::Map | ItemKind::Bytes | ItemKind::Text,
                Argument::Indefinite,
            ) => None,
            _ => {
                return Err(self.wrong_kind(
                    "array, map or indefinite-length string",
                    kind.name(),
                ));
            }
        };

        let mut item = self.enter()?;
        let mut index = 0usize;
        loop {
            match count {
                Some(len) if index as u64 == len => return Ok(item),
                None if item.is_exit() => return Ok(item.at(item.offset + 1)),
                _ => {}
            }
            let key = if kind == ItemKind::Map {
                item.expect_item()?;
                let key = item;
                item = item.next()?;
                Some(key)
            } else {
                None
            };
            item.expect_item()?;
            if matches!(kind, ItemKind::Bytes | ItemKind::Text) {
                item.expect_chunk(head.major)?;
            }
            visit(key, item, index);
            item = item.next()?;
            index += 1;
        }
    }

    /// Fails unless a data item is next; the end of input and break markers are not.
    fn expect_item(&self) -> Result<()> {
        if self.kind()? == ItemKind::Break {
            return Err(CborError::format(self.offset, FormatViolation::UnexpectedBreak));
        }
        Ok(())
    }

    fn expect_chunk(&self, major: u8) -> Result<()> {
        let (chunk, _) = self.head()?;
        let found = if self.tag_count > 0 { MAJOR_TAG } else { chunk.major };
        if found != major {
            return Err(CborError::format(
                self.tags_start,
                FormatViolation::MismatchedChunk {
                    expected: major,
                    found,
                },
            ));
        }
        if chunk.argument == Argument::Indefinite {
            return Err(CborError::format(
                self.offset,
                FormatViolation::NestedIndefiniteChunk,
            ));
        }
        Ok(())
    }

    /// Decodes the current item into a [`Value`].
    ///
    /// Tags already stepped over are not part of the result.
    pub fn decode_value(&self, registry: &TagRegistry) -> Result<Value> {
        Decoder::at(self.input, self.offset, self.limits).decode_value(registry)
    }

    /// Deserializes the current item, borrowing strings from the input.
    pub fn decode<T: Deserialize<'de>>(&self) -> Result<T> {
        Decoder::at(self.input, self.offset, self.limits).decode()
    }
}
