//! Head byte and argument encoding shared by the encoder and decoder.
//!
//! A head is one byte holding the major type (high 3 bits) and the additional
//! information (low 5 bits), optionally followed by a 1, 2, 4 or 8 byte
//! big-endian argument.

use std::io::{self, Write};

use half::f16;

use crate::MAJOR_SIMPLE;
use crate::error::{CborError, FormatViolation, Result};

pub(crate) const ONE_BYTE: u8 = 24;
pub(crate) const TWO_BYTES: u8 = 25;
pub(crate) const FOUR_BYTES: u8 = 26;
pub(crate) const EIGHT_BYTES: u8 = 27;
pub(crate) const INDEFINITE: u8 = 31;

/// The break marker terminating indefinite-length items.
pub const BREAK: u8 = (MAJOR_SIMPLE << 5) | INDEFINITE;

/// The decoded argument of a head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    /// Inline value or big-endian integer argument.
    Uint(u64),
    /// Half, single or double precision float under major type 7, widened to `f64`.
    Float(f64),
    /// Additional information 31: indefinite length, or break under major type 7.
    Indefinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Head {
    pub major: u8,
    pub info: u8,
    pub argument: Argument,
}

impl Head {
    pub fn is_break(&self) -> bool {
        self.major == MAJOR_SIMPLE && self.info == INDEFINITE
    }
}

/// Builds the shortest head for `(major, value)`.
///
/// Returns the bytes and how many of them are used.
pub fn encode_head(major: u8, value: u64) -> ([u8; 9], usize) {
    let mut buf = [0u8; 9];
    let initial = major << 5;
    let len = if value < ONE_BYTE as u64 {
        buf[0] = initial | value as u8;
        1
    } else if value <= u8::MAX as u64 {
        buf[0] = initial | ONE_BYTE;
        buf[1] = value as u8;
        2
    } else if value <= u16::MAX as u64 {
        buf[0] = initial | TWO_BYTES;
        buf[1..3].copy_from_slice(&(value as u16).to_be_bytes());
        3
    } else if value <= u32::MAX as u64 {
        buf[0] = initial | FOUR_BYTES;
        buf[1..5].copy_from_slice(&(value as u32).to_be_bytes());
        5
    } else {
        buf[0] = initial | EIGHT_BYTES;
        buf[1..9].copy_from_slice(&value.to_be_bytes());
        9
    };
    (buf, len)
}

pub fn write_head<W: Write + ?Sized>(writer: &mut W, major: u8, value: u64) -> io::Result<()> {
    let (buf, len) = encode_head(major, value);
    writer.write_all(&buf[..len])
}

/// Writes a float under major type 7.
///
/// Always eight bytes unless the `compact_floats` feature is enabled, in which
/// case the shortest width that round-trips exactly is used.
pub fn write_float<W: Write + ?Sized>(writer: &mut W, value: f64) -> io::Result<()> {
    #[cfg(feature = "compact_floats")]
    {
        if value.is_nan() {
            return writer.write_all(&[(MAJOR_SIMPLE << 5) | TWO_BYTES, 0x7e, 0x00]);
        }
        let half = f16::from_f64(value);
        if half.to_f64() == value {
            writer.write_all(&[(MAJOR_SIMPLE << 5) | TWO_BYTES])?;
            return writer.write_all(&half.to_be_bytes());
        }
        let single = value as f32;
        if single as f64 == value {
            writer.write_all(&[(MAJOR_SIMPLE << 5) | FOUR_BYTES])?;
            return writer.write_all(&single.to_be_bytes());
        }
    }
    writer.write_all(&[(MAJOR_SIMPLE << 5) | EIGHT_BYTES])?;
    writer.write_all(&value.to_be_bytes())
}

/// Parses the head starting at `offset`, returning it with the offset just past it.
pub fn read_head(input: &[u8], offset: usize) -> Result<(Head, usize)> {
    let initial = *input
        .get(offset)
        .ok_or(CborError::Truncated { offset, needed: 1 })?;
    let major = initial >> 5;
    let info = initial & 0x1f;
    let start = offset + 1;

    let width = match info {
        0..=23 => 0,
        ONE_BYTE => 1,
        TWO_BYTES => 2,
        FOUR_BYTES => 4,
        EIGHT_BYTES => 8,
        INDEFINITE => {
            let head = Head {
                major,
                info,
                argument: Argument::Indefinite,
            };
            return Ok((head, start));
        }
        _ => {
            return Err(CborError::format(
                offset,
                FormatViolation::ReservedAdditionalInfo(info),
            ));
        }
    };

    let bytes = take(input, start, width)?;
    let argument = if width == 0 {
        Argument::Uint(info as u64)
    } else if major == MAJOR_SIMPLE && width > 1 {
        Argument::Float(float_from_bits(bytes))
    } else {
        Argument::Uint(be_uint(bytes))
    };
    Ok((
        Head {
            major,
            info,
            argument,
        },
        start + width,
    ))
}

/// Returns `len` bytes at `start`, or a truncation error.
pub(crate) fn take(input: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    let end = start.saturating_add(len);
    input.get(start..end).ok_or_else(|| CborError::Truncated {
        offset: input.len(),
        needed: end.saturating_sub(input.len().max(start)),
    })
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn float_from_bits(bytes: &[u8]) -> f64 {
    let bits = be_uint(bytes);
    match bytes.len() {
        2 => f16::from_bits(bits as u16).to_f64(),
        4 => f32::from_bits(bits as u32) as f64,
        _ => f64::from_bits(bits),
    }
}
