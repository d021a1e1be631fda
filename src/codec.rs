//! Byte <-> integer conversion with configurable byte order and signedness.
//!
//! Every read is bounds-checked against the slice before any byte is
//! touched; a request that does not fit yields [`CodecError::OutOfRange`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Byte order of a multi-byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little-endian byte order
    Little,
    /// Big-endian byte order
    #[default]
    Big,
}

impl Endianness {
    /// Parse the spelling used by definition files (`big`, `little`).
    pub fn from_attr(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "big" | "be" => Some(Endianness::Big),
            "little" | "le" => Some(Endianness::Little),
            _ => None,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "little"),
            Endianness::Big => write!(f, "big"),
        }
    }
}

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{width} byte(s) at offset {offset:#x} exceed buffer of {len} bytes")]
    OutOfRange { offset: i64, width: usize, len: usize },

    #[error("unsupported integer width {0} (expected 1..=8)")]
    InvalidWidth(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

fn checked_range(len: usize, offset: usize, width: usize) -> Result<std::ops::Range<usize>> {
    if width == 0 || width > 8 {
        return Err(CodecError::InvalidWidth(width));
    }
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(CodecError::OutOfRange {
            offset: i64::try_from(offset).unwrap_or(i64::MAX),
            width,
            len,
        }),
    }
}

/// Read `width` bytes at `offset` as an integer.
///
/// Signed reads are sign-extended from the top bit of the `width`-byte value.
pub fn read_int(
    bytes: &[u8],
    endianness: Endianness,
    offset: usize,
    width: usize,
    signed: bool,
) -> Result<i64> {
    let range = checked_range(bytes.len(), offset, width)?;
    let slice = &bytes[range];

    let raw = match endianness {
        Endianness::Big => slice.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
        Endianness::Little => slice.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64),
    };

    if signed && width < 8 {
        let shift = 64 - (width as u32 * 8);
        Ok(((raw << shift) as i64) >> shift)
    } else {
        Ok(raw as i64)
    }
}

/// Read a big- or little-endian IEEE-754 single.
pub fn read_f32(bytes: &[u8], endianness: Endianness, offset: usize) -> Result<f32> {
    let bits = read_int(bytes, endianness, offset, 4, false)? as u32;
    Ok(f32::from_bits(bits))
}

/// Encode `value` into `width` bytes, keeping only the low-order bytes.
///
/// Widths above 8 are zero/sign padded on the high-order side.
pub fn write_int(value: i64, endianness: Endianness, width: usize) -> Vec<u8> {
    let be = value.to_be_bytes();
    let pad = if value < 0 { 0xff } else { 0x00 };
    let mut out: Vec<u8> = (0..width)
        .map(|i| {
            // i counts from the most significant of `width` bytes
            let from_low = width - 1 - i;
            if from_low < 8 {
                be[7 - from_low]
            } else {
                pad
            }
        })
        .collect();
    if endianness == Endianness::Little {
        out.reverse();
    }
    out
}

/// Encode `value` directly into `dest[offset..offset + width]`.
pub fn write_int_into(
    value: i64,
    endianness: Endianness,
    dest: &mut [u8],
    offset: usize,
    width: usize,
) -> Result<()> {
    let range = checked_range(dest.len(), offset, width)?;
    dest[range].copy_from_slice(&write_int(value, endianness, width));
    Ok(())
}
