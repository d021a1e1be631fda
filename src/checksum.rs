//! Segmented checksum calculation and validation.
//!
//! A checksum region is a run of consecutive 12-byte records located at
//! `storage_address - ram_offset` in the image:
//!
//! ```text
//! +0  start address  (4 bytes, big-endian, signed)
//! +4  end address    (4 bytes, big-endian, signed)
//! +8  stored diff    (4 bytes, big-endian, signed)
//! ```
//!
//! Each record covers the words in `[start, end)`. The stored difference is
//! chosen so that `diff + sum(words) == CHECK_TOTAL` (wrapping). Start and
//! end are RAM addresses and get the RAM offset removed, except for a 0/0
//! record, which is never translated.

use crate::codec::{self, CodecError, Endianness};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Target total of every checksummed segment.
pub const CHECK_TOTAL: i32 = 0x5AA5_A55A;

/// Size of one on-disk checksum record.
pub const RECORD_SIZE: usize = 12;

/// Result of validating a checksum region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumOutcome {
    /// Every record sums to `CHECK_TOTAL`.
    AllValid,
    /// The first record is the 0/0/`CHECK_TOTAL` sentinel.
    AllDisabled,
    /// 1-based position of the first record that does not sum up.
    Invalid(usize),
}

impl ChecksumOutcome {
    /// Legacy integer encoding: 0 valid, -1 disabled, k for record k.
    pub fn code(&self) -> i64 {
        match self {
            ChecksumOutcome::AllValid => 0,
            ChecksumOutcome::AllDisabled => -1,
            ChecksumOutcome::Invalid(k) => *k as i64,
        }
    }

    /// True only for [`ChecksumOutcome::AllValid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, ChecksumOutcome::AllValid)
    }
}

/// One decoded checksum record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub start: i32,
    pub end: i32,
    pub diff: i32,
}

impl ChecksumRecord {
    fn read(image: &[u8], at: usize) -> Result<Self, CodecError> {
        Ok(Self {
            start: read_word(image, at)?,
            end: read_word(image, at + 4)?,
            diff: read_word(image, at + 8)?,
        })
    }

    /// A 0/0 pair marks a segment that is not address-translated.
    pub fn is_untranslated(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    fn effective_offset(&self, ram_offset: i64) -> i64 {
        if self.is_untranslated() {
            0
        } else {
            ram_offset
        }
    }
}

fn read_word(image: &[u8], at: usize) -> Result<i32, CodecError> {
    Ok(codec::read_int(image, Endianness::Big, at, 4, true)? as i32)
}

fn to_offset(addr: i64, width: usize, len: usize) -> Result<usize, CodecError> {
    usize::try_from(addr).map_err(|_| CodecError::OutOfRange {
        offset: addr,
        width,
        len,
    })
}

/// Remove `ram_offset` from a RAM address; overflow is out of range.
fn translate(addr: i64, ram_offset: i64, width: usize, len: usize) -> Result<i64, CodecError> {
    addr.checked_sub(ram_offset).ok_or(CodecError::OutOfRange {
        offset: addr,
        width,
        len,
    })
}

/// Wrapping sum of the big-endian words starting at each 4-byte step in
/// `[start, end)`. The last word may extend past `end`.
fn word_sum(image: &[u8], start: i64, end: i64) -> Result<i32, CodecError> {
    let mut sum = 0i32;
    let mut at = start;
    while at < end {
        let offset = to_offset(at, 4, image.len())?;
        sum = sum.wrapping_add(read_word(image, offset)?);
        at += 4;
    }
    Ok(sum)
}

/// Sum of the segment a record covers, after address translation.
fn record_sum(image: &[u8], record: &ChecksumRecord, ram_offset: i64) -> Result<i32, CodecError> {
    let off = record.effective_offset(ram_offset);
    let start = translate(record.start as i64, off, 4, image.len())?;
    let end = translate(record.end as i64, off, 4, image.len())?;
    word_sum(image, start, end)
}

/// Record offsets inside the image, `data_size / 12` of them.
fn record_offsets(
    image_len: usize,
    storage_address: i64,
    data_size: usize,
    ram_offset: i64,
) -> Result<impl Iterator<Item = usize>, CodecError> {
    let base = translate(storage_address, ram_offset, data_size, image_len)?;
    let base = to_offset(base, data_size, image_len)?;
    let count = data_size / RECORD_SIZE;
    Ok((0..count).map(move |i| base + i * RECORD_SIZE))
}

/// Recompute the stored difference of every record in the region, in place.
pub fn calculate(
    image: &mut [u8],
    storage_address: i64,
    data_size: usize,
    ram_offset: i64,
) -> Result<(), CodecError> {
    debug!(
        storage_address = format_args!("{:#x}", storage_address),
        data_size,
        ram_offset = format_args!("{:#x}", ram_offset),
        "Calculating checksums"
    );
    for at in record_offsets(image.len(), storage_address, data_size, ram_offset)? {
        let record = ChecksumRecord::read(image, at)?;
        let sum = record_sum(image, &record, ram_offset)?;
        let value = CHECK_TOTAL.wrapping_sub(sum);
        trace!(at, start = record.start, end = record.end, value, "Rewriting checksum");
        codec::write_int_into(value as i64, Endianness::Big, image, at + 8, 4)?;
    }
    Ok(())
}

/// Check every record of the region.
pub fn validate(
    image: &[u8],
    storage_address: i64,
    data_size: usize,
    ram_offset: i64,
) -> Result<ChecksumOutcome, CodecError> {
    let mut first_invalid = None;

    for (index, at) in record_offsets(image.len(), storage_address, data_size, ram_offset)?
        .enumerate()
    {
        let record = ChecksumRecord::read(image, at)?;
        if index == 0 && record.is_untranslated() && record.diff == CHECK_TOTAL {
            debug!("All checksums disabled by first record");
            return Ok(ChecksumOutcome::AllDisabled);
        }

        let sum = record_sum(image, &record, ram_offset)?;
        let result = CHECK_TOTAL.wrapping_sub(record.diff).wrapping_sub(sum);
        if result != 0 && first_invalid.is_none() {
            trace!(index, result, "Checksum mismatch");
            first_invalid = Some(index + 1);
        }
    }

    let outcome = match first_invalid {
        Some(k) => ChecksumOutcome::Invalid(k),
        None => ChecksumOutcome::AllValid,
    };
    debug!(?outcome, "Checksum validation finished");
    Ok(outcome)
}
