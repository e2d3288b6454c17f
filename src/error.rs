use std::io;

use thiserror::Error;

/// Errors produced while encoding or decoding CBOR.
///
/// Every error is terminal for the call that produced it; no partial value is
/// ever returned.
#[derive(Debug, Error)]
pub enum CborError {
    /// Input ended before a head, argument or payload was complete.
    #[error("unexpected end of input at offset {offset}: {needed} more byte(s) required")]
    Truncated { offset: usize, needed: usize },

    /// The input is not well-formed CBOR.
    #[error("invalid CBOR at offset {offset}: {violation}")]
    Format {
        offset: usize,
        violation: FormatViolation,
    },

    /// The value matches no encoding rule and no registered tag capability.
    #[error("unencodable value: {0}")]
    Unencodable(String),

    /// A bignum whose magnitude does not fit the requested native integer type.
    #[error("integer magnitude of {bytes} bytes exceeds the 128-bit integer range")]
    UnsupportedOverflow { bytes: usize },

    /// A [`Walker`](crate::Walker) accessor was used on an item of another kind.
    #[error("expected {expected} at offset {offset}, found {found}")]
    WrongKind {
        offset: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid UTF-8 in text string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serde error: {0}")]
    Serde(String),
}

/// The ways a byte sequence can fail to be well-formed CBOR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatViolation {
    #[error("reserved additional information value {0}")]
    ReservedAdditionalInfo(u8),
    #[error("break marker outside an indefinite-length container")]
    UnexpectedBreak,
    #[error("major type {found} chunk inside an indefinite-length string of major type {expected}")]
    MismatchedChunk { expected: u8, found: u8 },
    #[error("indefinite-length chunk nested inside an indefinite-length string")]
    NestedIndefiniteChunk,
    #[error("major type {0} cannot have an indefinite length")]
    InvalidIndefinite(u8),
    #[error("simple value {0} is not allowed in the one-byte extension")]
    InvalidSimpleValue(u8),
    #[error("nesting deeper than {0} levels")]
    DepthLimitExceeded(usize),
    #[error("typed array tag {tag} payload of {len} bytes is not a whole number of elements")]
    TypedArrayLength { tag: u64, len: usize },
    #[error("bignum tag {0} requires a byte string payload")]
    BignumPayload(u64),
    #[error("tag {0} payload rejected by its registered transform")]
    InvalidTagPayload(u64),
    #[error("expected major type {expected}, found major type {found}")]
    UnexpectedType { expected: u8, found: u8 },
    #[error("declared length {0} exceeds the configured limit")]
    LengthLimitExceeded(u64),
}

impl CborError {
    pub(crate) fn format(offset: usize, violation: FormatViolation) -> Self {
        CborError::Format { offset, violation }
    }

    /// Returns the format violation, if this is a well-formedness error.
    pub fn violation(&self) -> Option<FormatViolation> {
        match self {
            CborError::Format { violation, .. } => Some(*violation),
            _ => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, CborError::Truncated { .. })
    }
}

impl serde::ser::Error for CborError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        CborError::Serde(msg.to_string())
    }
}

impl serde::de::Error for CborError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        CborError::Serde(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CborError>;

pub use self::CborError as Error;
