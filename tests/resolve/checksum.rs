//! Checksum engine behavior over whole images.

use romdef::checksum::{calculate, validate, ChecksumOutcome, CHECK_TOTAL};
use romdef::codec::{read_int, CodecError, Endianness};

use crate::common::{disabled_record, fill_pattern, write_records};

const REGION: usize = 0x300;
const RAM_OFFSET: i64 = 0xFF_0000;

/// 1KB image, three RAM-addressed segments, records at `REGION`.
fn image_with_segments() -> Vec<u8> {
    let mut image = vec![0u8; 0x400];
    fill_pattern(&mut image, 0, REGION);
    write_records(
        &mut image,
        REGION,
        &[
            (0xFF_0000, 0xFF_0100, 0),
            (0xFF_0100, 0xFF_0200, 0),
            (0xFF_0200, 0xFF_0300, 0),
        ],
    );
    image
}

fn region_address() -> i64 {
    REGION as i64 + RAM_OFFSET
}

#[test]
fn test_calculate_then_validate_is_valid() {
    let mut image = image_with_segments();
    assert!(matches!(
        validate(&image, region_address(), 36, RAM_OFFSET).unwrap(),
        ChecksumOutcome::Invalid(1)
    ));

    calculate(&mut image, region_address(), 36, RAM_OFFSET).unwrap();
    assert_eq!(
        validate(&image, region_address(), 36, RAM_OFFSET).unwrap(),
        ChecksumOutcome::AllValid
    );
}

#[test]
fn test_disabled_sentinel_wins_over_broken_records() {
    let mut image = image_with_segments();
    write_records(&mut image, REGION, &[disabled_record()]);
    // records two and three are still unrepaired
    let outcome = validate(&image, region_address(), 36, RAM_OFFSET).unwrap();
    assert_eq!(outcome, ChecksumOutcome::AllDisabled);
    assert_eq!(outcome.code(), -1);
}

#[test]
fn test_third_record_corrupted() {
    let mut image = image_with_segments();
    calculate(&mut image, region_address(), 36, RAM_OFFSET).unwrap();
    let diff_at = REGION + 2 * 12 + 8;
    image[diff_at + 3] ^= 0x01;

    let outcome = validate(&image, region_address(), 36, RAM_OFFSET).unwrap();
    assert_eq!(outcome, ChecksumOutcome::Invalid(3));
    assert_eq!(outcome.code(), 3);
}

#[test]
fn test_mutating_a_segment_flags_that_segment() {
    for (k, offset) in [(1usize, 0x10usize), (2, 0x1ff), (3, 0x200)] {
        let mut image = image_with_segments();
        calculate(&mut image, region_address(), 36, RAM_OFFSET).unwrap();
        image[offset] = image[offset].wrapping_add(1);
        assert_eq!(
            validate(&image, region_address(), 36, RAM_OFFSET).unwrap(),
            ChecksumOutcome::Invalid(k),
            "byte {:#x} lies in segment {}",
            offset,
            k
        );
    }
}

#[test]
fn test_diff_written_big_endian() {
    let mut image = vec![0u8; 64];
    image[0..4].copy_from_slice(&1i32.to_be_bytes());
    write_records(&mut image, 32, &[(0x4, 0x8, 0)]);
    // the word at 0 lies outside the 4..8 segment
    calculate(&mut image, 32, 12, 0).unwrap();
    let diff = read_int(&image, Endianness::Big, 40, 4, true).unwrap();
    assert_eq!(diff, CHECK_TOTAL as i64);
}

#[test]
fn test_region_outside_image_is_out_of_range() {
    let image = vec![0u8; 64];
    let err = validate(&image, 60, 12, 0).unwrap_err();
    assert!(matches!(err, CodecError::OutOfRange { .. }));
}

#[test]
fn test_read_int_never_reads_past_buffer() {
    let backing = [0x11u8, 0x22, 0x33, 0x44, 0xAA, 0xBB];
    let view = &backing[..4];
    assert_eq!(read_int(view, Endianness::Big, 0, 4, false).unwrap(), 0x1122_3344);
    for offset in 1..=4 {
        let err = read_int(view, Endianness::Big, offset, 4, false).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { .. }));
    }
    assert!(read_int(view, Endianness::Little, usize::MAX, 2, false).is_err());
}
