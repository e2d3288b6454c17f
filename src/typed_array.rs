//! RFC 8746 typed arrays: byte string payloads under tags 64-86.
//!
//! The tag number encodes the element type as `0b010_f_s_e_ll`: `f` float,
//! `s` signed, `e` little-endian, `ll` the width class. Decoded arrays hold
//! native values; encoding emits the tag matching the host byte order.

use half::f16;
use serde::{Serialize, Serializer};
use serde_bytes::ByteBuf;

use crate::error::FormatViolation;
use crate::tags::Tagged;

const FLOAT_FLAG: u64 = 0b1_0000;
const SIGNED_FLAG: u64 = 0b1000;
const LITTLE_ENDIAN_FLAG: u64 = 0b100;
const WIDTH_MASK: u64 = 0b11;

/// Every tag this module decodes. Float128 (83, 87) and tag 76 are not supported.
pub const TYPED_ARRAY_TAGS: [u64; 21] = [
    64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 77, 78, 79, 80, 81, 82, 84, 85, 86,
];

/// A homogeneous numeric array carried by an RFC 8746 tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    Uint8(Vec<u8>),
    Uint8Clamped(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    Sint8(Vec<i8>),
    Sint16(Vec<i16>),
    Sint32(Vec<i32>),
    Sint64(Vec<i64>),
    Float16(Vec<f16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! read_elements {
    ($bytes:expr, $ty:ty, $little:expr) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(WIDTH)
            .map(|chunk| {
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(chunk);
                if $little {
                    <$ty>::from_le_bytes(raw)
                } else {
                    <$ty>::from_be_bytes(raw)
                }
            })
            .collect::<Vec<$ty>>()
    }};
}

macro_rules! native_bytes {
    ($items:expr) => {
        $items.iter().flat_map(|n| n.to_ne_bytes()).collect::<Vec<u8>>()
    };
}

pub fn is_typed_array_tag(tag: u64) -> bool {
    TYPED_ARRAY_TAGS.contains(&tag)
}

/// Size in bytes of one element for `tag`.
fn element_width(tag: u64) -> usize {
    let class = (tag & WIDTH_MASK) as u32;
    if tag & FLOAT_FLAG != 0 {
        2 << class
    } else {
        1 << class
    }
}

impl TypedArray {
    /// Decodes the byte string payload of a typed array tag.
    ///
    /// Returns `Ok(None)` for tags outside the supported set.
    pub fn from_tag_payload(tag: u64, bytes: &[u8]) -> Result<Option<Self>, FormatViolation> {
        if !is_typed_array_tag(tag) {
            return Ok(None);
        }
        if bytes.len() % element_width(tag) != 0 {
            return Err(FormatViolation::TypedArrayLength {
                tag,
                len: bytes.len(),
            });
        }
        let little = tag & LITTLE_ENDIAN_FLAG != 0;
        let array = match tag & !LITTLE_ENDIAN_FLAG {
            64 if !little => TypedArray::Uint8(bytes.to_vec()),
            64 => TypedArray::Uint8Clamped(bytes.to_vec()),
            65 => TypedArray::Uint16(read_elements!(bytes, u16, little)),
            66 => TypedArray::Uint32(read_elements!(bytes, u32, little)),
            67 => TypedArray::Uint64(read_elements!(bytes, u64, little)),
            72 => TypedArray::Sint8(bytes.iter().map(|&b| b as i8).collect()),
            73 => TypedArray::Sint16(read_elements!(bytes, i16, little)),
            74 => TypedArray::Sint32(read_elements!(bytes, i32, little)),
            75 => TypedArray::Sint64(read_elements!(bytes, i64, little)),
            80 => TypedArray::Float16(read_elements!(bytes, f16, little)),
            81 => TypedArray::Float32(read_elements!(bytes, f32, little)),
            82 => TypedArray::Float64(read_elements!(bytes, f64, little)),
            _ => return Ok(None),
        };
        Ok(Some(array))
    }

    /// The tag for this element type in host byte order.
    pub fn tag(&self) -> u64 {
        let (tag, multi_byte) = match self {
            TypedArray::Uint8(_) => (64, false),
            TypedArray::Uint8Clamped(_) => (68, false),
            TypedArray::Uint16(_) => (65, true),
            TypedArray::Uint32(_) => (66, true),
            TypedArray::Uint64(_) => (67, true),
            TypedArray::Sint8(_) => (72, false),
            TypedArray::Sint16(_) => (73, true),
            TypedArray::Sint32(_) => (74, true),
            TypedArray::Sint64(_) => (75, true),
            TypedArray::Float16(_) => (80, true),
            TypedArray::Float32(_) => (81, true),
            TypedArray::Float64(_) => (82, true),
        };
        if multi_byte && cfg!(target_endian = "little") {
            tag | LITTLE_ENDIAN_FLAG
        } else {
            tag
        }
    }

    /// Element bytes in host byte order, matching [`TypedArray::tag`].
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            TypedArray::Uint8(items) | TypedArray::Uint8Clamped(items) => items.clone(),
            TypedArray::Uint16(items) => native_bytes!(items),
            TypedArray::Uint32(items) => native_bytes!(items),
            TypedArray::Uint64(items) => native_bytes!(items),
            TypedArray::Sint8(items) => items.iter().map(|&n| n as u8).collect(),
            TypedArray::Sint16(items) => native_bytes!(items),
            TypedArray::Sint32(items) => native_bytes!(items),
            TypedArray::Sint64(items) => native_bytes!(items),
            TypedArray::Float16(items) => native_bytes!(items),
            TypedArray::Float32(items) => native_bytes!(items),
            TypedArray::Float64(items) => native_bytes!(items),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedArray::Uint8(items) | TypedArray::Uint8Clamped(items) => items.len(),
            TypedArray::Uint16(items) => items.len(),
            TypedArray::Uint32(items) => items.len(),
            TypedArray::Uint64(items) => items.len(),
            TypedArray::Sint8(items) => items.len(),
            TypedArray::Sint16(items) => items.len(),
            TypedArray::Sint32(items) => items.len(),
            TypedArray::Sint64(items) => items.len(),
            TypedArray::Float16(items) => items.len(),
            TypedArray::Float32(items) => items.len(),
            TypedArray::Float64(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for TypedArray {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if !serializer.is_human_readable() {
            let payload = ByteBuf::from(self.to_bytes());
            return Tagged::new(Some(self.tag()), payload).serialize(serializer);
        }
        match self {
            TypedArray::Uint8(items) | TypedArray::Uint8Clamped(items) => items.serialize(serializer),
            TypedArray::Uint16(items) => items.serialize(serializer),
            TypedArray::Uint32(items) => items.serialize(serializer),
            TypedArray::Uint64(items) => items.serialize(serializer),
            TypedArray::Sint8(items) => items.serialize(serializer),
            TypedArray::Sint16(items) => items.serialize(serializer),
            TypedArray::Sint32(items) => items.serialize(serializer),
            TypedArray::Sint64(items) => items.serialize(serializer),
            TypedArray::Float16(items) => serializer.collect_seq(items.iter().map(|n| n.to_f32())),
            TypedArray::Float32(items) => items.serialize(serializer),
            TypedArray::Float64(items) => items.serialize(serializer),
        }
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for TypedArray {
                fn from(items: Vec<$ty>) -> Self {
                    TypedArray::$variant(items)
                }
            }
        )*
    };
}

impl_from_vec! {
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    i8 => Sint8,
    i16 => Sint16,
    i32 => Sint32,
    i64 => Sint64,
    f16 => Float16,
    f32 => Float32,
    f64 => Float64,
}
