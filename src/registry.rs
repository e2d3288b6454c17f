//! Semantic tag registry.
//!
//! Two independent tables make tags pluggable without touching the encoder or
//! decoder dispatch:
//! - decode side: tag number -> transform applied to the decoded payload;
//! - encode side: ordered (predicate, to-tag) capabilities consulted for values
//!   that are not primitive.
//!
//! A registry is built once and never mutated afterwards, so a shared
//! reference can be used from any number of threads.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use tracing::{debug, trace};

use crate::bignum::BigInt;
use crate::error::FormatViolation;
use crate::typed_array::{TYPED_ARRAY_TAGS, TypedArray};
use crate::value::Value;
use crate::{
    TAG_DATETIME_STRING, TAG_EPOCH_DATETIME, TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM, TAG_SET,
    TAG_URI,
};

/// Transform applied to the payload of a registered tag.
pub type DecodeTransform = dyn Fn(Value) -> Result<Value, FormatViolation> + Send + Sync;
/// Produces the tag number and content for the values a capability applies to.
pub type EncodeCapability = dyn Fn(&Value) -> Option<(u64, Value)> + Send + Sync;

static STANDARD: Lazy<TagRegistry> = Lazy::new(|| {
    TagRegistry::builder()
        .with_bignums()
        .with_typed_arrays()
        .retain_tag(TAG_DATETIME_STRING)
        .retain_tag(TAG_EPOCH_DATETIME)
        .retain_tag(TAG_URI)
        .retain_tag(TAG_SET)
        .build()
});

/// Immutable set of tag transforms shared by encode and decode.
pub struct TagRegistry {
    decoders: HashMap<u64, Box<DecodeTransform>>,
    encoders: Vec<Box<EncodeCapability>>,
}

impl TagRegistry {
    pub fn builder() -> TagRegistryBuilder {
        TagRegistryBuilder::default()
    }

    /// A registry with no entries: every tag passes its payload through.
    pub fn empty() -> Self {
        TagRegistry {
            decoders: HashMap::new(),
            encoders: Vec::new(),
        }
    }

    /// The process-wide default registry.
    ///
    /// Holds bignums (2, 3), typed arrays (64-86) and keeps tags 0, 1, 32 and
    /// 258 around their payloads as [`Value::Tag`].
    pub fn standard() -> &'static TagRegistry {
        &STANDARD
    }

    pub fn has_decoder(&self, tag: u64) -> bool {
        self.decoders.contains_key(&tag)
    }

    pub fn decode_tag_count(&self) -> usize {
        self.decoders.len()
    }

    pub fn encode_capability_count(&self) -> usize {
        self.encoders.len()
    }

    /// Applies the transform registered for `tag`, or returns the payload unchanged.
    pub fn decode_tag(&self, tag: u64, payload: Value) -> Result<Value, FormatViolation> {
        match self.decoders.get(&tag) {
            Some(transform) => transform(payload),
            None => {
                trace!(tag, "no transform registered, passing payload through");
                Ok(payload)
            }
        }
    }

    /// Returns the tag and content to encode `value` with, if it is tag-capable.
    ///
    /// [`Value::Tag`] always is; other values need a matching capability.
    pub fn tag_for<'a>(&self, value: &'a Value) -> Option<(u64, Cow<'a, Value>)> {
        if let Value::Tag(tag, content) = value {
            return Some((*tag, Cow::Borrowed(content.as_ref())));
        }
        self.encoders
            .iter()
            .find_map(|capability| capability(value))
            .map(|(tag, content)| (tag, Cow::Owned(content)))
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("TagRegistry")
            .field("decode_tags", &tags)
            .field("encode_capabilities", &self.encoders.len())
            .finish()
    }
}

/// Collects registrations before freezing them into a [`TagRegistry`].
#[derive(Default)]
pub struct TagRegistryBuilder {
    decoders: HashMap<u64, Box<DecodeTransform>>,
    encoders: Vec<Box<EncodeCapability>>,
}

impl TagRegistryBuilder {
    /// Registers the decode transform for `tag`, replacing any earlier one.
    pub fn decode_tag<F>(mut self, tag: u64, transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value, FormatViolation> + Send + Sync + 'static,
    {
        self.decoders.insert(tag, Box::new(transform));
        self
    }

    /// Registers an encode capability. Capabilities are tried in registration order.
    pub fn encode_capability<P, F>(self, predicate: P, to_tag: F) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(&Value) -> (u64, Value) + Send + Sync + 'static,
    {
        self.encode_with(move |value| predicate(value).then(|| to_tag(value)))
    }

    /// Registers an encode capability as one function that returns `None` for
    /// values it does not apply to.
    pub fn encode_with<F>(mut self, capability: F) -> Self
    where
        F: Fn(&Value) -> Option<(u64, Value)> + Send + Sync + 'static,
    {
        self.encoders.push(Box::new(capability));
        self
    }

    /// Decodes `tag` as [`Value::Tag`] around its payload instead of dropping the tag.
    pub fn retain_tag(self, tag: u64) -> Self {
        self.decode_tag(tag, move |payload| Ok(Value::Tag(tag, Box::new(payload))))
    }

    /// Tags 2 and 3: byte string magnitudes become integers.
    pub fn with_bignums(self) -> Self {
        self.decode_tag(TAG_POSITIVE_BIGNUM, |payload| bignum(TAG_POSITIVE_BIGNUM, payload))
            .decode_tag(TAG_NEGATIVE_BIGNUM, |payload| bignum(TAG_NEGATIVE_BIGNUM, payload))
    }

    /// RFC 8746 typed arrays, both directions.
    pub fn with_typed_arrays(self) -> Self {
        let builder = TYPED_ARRAY_TAGS.iter().fold(self, |builder, &tag| {
            builder.decode_tag(tag, move |payload| typed_array(tag, payload))
        });
        builder.encode_with(|value| match value {
            Value::TypedArray(array) => Some((array.tag(), Value::Bytes(array.to_bytes()))),
            _ => None,
        })
    }

    pub fn build(self) -> TagRegistry {
        debug!(
            decode_tags = self.decoders.len(),
            encode_capabilities = self.encoders.len(),
            "tag registry built"
        );
        TagRegistry {
            decoders: self.decoders,
            encoders: self.encoders,
        }
    }
}

fn bignum(tag: u64, payload: Value) -> Result<Value, FormatViolation> {
    match payload {
        Value::Bytes(bytes) => Ok(Value::from(BigInt::from_tag_payload(
            tag == TAG_NEGATIVE_BIGNUM,
            &bytes,
        ))),
        _ => Err(FormatViolation::BignumPayload(tag)),
    }
}

fn typed_array(tag: u64, payload: Value) -> Result<Value, FormatViolation> {
    match payload {
        Value::Bytes(bytes) => match TypedArray::from_tag_payload(tag, &bytes)? {
            Some(array) => Ok(Value::TypedArray(array)),
            None => Ok(Value::Bytes(bytes)),
        },
        other => Ok(other),
    }
}
