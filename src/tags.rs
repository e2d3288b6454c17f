use serde::de::{self, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Newtype name the CBOR encoder and decoder recognise as "tag number, then content".
pub(crate) const TAGGED_TOKEN: &str = "@@TAGGED_CBOR_TAG@@";

/// A tagged CBOR value for the serde path
///
/// In CBOR this is written as a real major type 6 tag followed by the value.
/// Human-readable formats see a `{"tag": .., "value": ..}` structure instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    /// The CBOR tag number (optional for compatibility)
    pub tag: Option<u64>,
    /// The tagged value
    pub value: T,
}

impl<T> Tagged<T> {
    /// Create a new tagged value
    pub fn new(tag: Option<u64>, value: T) -> Self {
        Tagged { tag, value }
    }
}

impl<T: Serialize> Serialize for Tagged<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            let mut state = serializer.serialize_struct("Tagged", 2)?;
            state.serialize_field("tag", &self.tag)?;
            state.serialize_field("value", &self.value)?;
            return state.end();
        }
        match self.tag {
            Some(tag) => serializer.serialize_newtype_struct(TAGGED_TOKEN, &(tag, &self.value)),
            None => self.value.serialize(serializer),
        }
    }
}

// Handles both tagged CBOR values and plain values (e.g., from JSON)
impl<'de, T> Deserialize<'de> for Tagged<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TaggedVisitor<T> {
            marker: PhantomData<T>,
        }

        impl<'de, T> Visitor<'de> for TaggedVisitor<T>
        where
            T: Deserialize<'de>,
        {
            type Value = Tagged<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a tagged value or a plain value")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Tagged<T>, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(self)
            }

            // A plain value is wrapped with no tag
            fn visit_bool<E>(self, v: bool) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::BoolDeserializer::new(v)).map(untagged)
            }

            fn visit_i64<E>(self, v: i64) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::I64Deserializer::new(v)).map(untagged)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::U64Deserializer::new(v)).map(untagged)
            }

            fn visit_f64<E>(self, v: f64) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::F64Deserializer::new(v)).map(untagged)
            }

            fn visit_str<E>(self, v: &str) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::StrDeserializer::new(v)).map(untagged)
            }

            fn visit_string<E>(self, v: String) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::StringDeserializer::new(v)).map(untagged)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Tagged<T>, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::BytesDeserializer::new(v)).map(untagged)
            }

            fn visit_seq<A>(self, seq: A) -> Result<Tagged<T>, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                T::deserialize(de::value::SeqAccessDeserializer::new(seq)).map(untagged)
            }

            fn visit_map<A>(self, map: A) -> Result<Tagged<T>, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                // The CBOR decoder presents a tag as this structure too
                #[derive(Deserialize)]
                struct TaggedHelper<T> {
                    tag: Option<u64>,
                    value: T,
                }

                let helper =
                    TaggedHelper::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(Tagged {
                    tag: helper.tag,
                    value: helper.value,
                })
            }
        }

        deserializer.deserialize_newtype_struct(
            TAGGED_TOKEN,
            TaggedVisitor {
                marker: PhantomData,
            },
        )
    }
}

fn untagged<T>(value: T) -> Tagged<T> {
    Tagged { tag: None, value }
}
