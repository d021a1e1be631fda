//! Image loader and background worker.

use romdef::checksum::ChecksumOutcome;
use romdef::loader::{ImageLoader, LoadOutcome};
use romdef::model::Rom;
use romdef::progress::{CancelFlag, NoProgress, Phase};
use romdef::worker::{load_in_background, LoadRequest, TimeoutConfig};
use romdef::{LoaderConfig, RomError};
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::test_data::*;
use crate::common::*;

const REGION: usize = 0xF00;

/// Sample image with three checksum records over 0..0xF00.
fn sample_image() -> Vec<u8> {
    let mut image = image_with_id(0x1000, SAMPLE_ROM_ID_ADDRESS, SAMPLE_ROM_ID);
    fill_pattern(&mut image, 0x400, 0x600);
    write_records(
        &mut image,
        REGION,
        &[
            (0xFF_0000, 0xFF_0200, 0),
            (0xFF_0200, 0xFF_0400, 0),
            (0xFF_0400, 0xFF_0F00, 0),
        ],
    );
    image
}

fn sample_candidates() -> Option<Vec<romdef::DefinitionCandidate>> {
    sample_file_exists(SAMPLE_NATIVE_DEFS).then(|| {
        vec![romdef::DefinitionCandidate::from_path(sample_file_path(
            SAMPLE_NATIVE_DEFS,
        ))]
    })
}

#[test]
fn test_load_path_reports_monotonic_progress() {
    let Some(candidates) = sample_candidates() else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("a4tf400e.bin");
    std::fs::write(&image_path, sample_image()).unwrap();

    let sink = RecordingSink::default();
    let outcome = ImageLoader::default()
        .load_path(&image_path, &candidates, &sink)
        .unwrap();
    let LoadOutcome::Loaded(loaded) = outcome else {
        panic!("expected a loaded image, got {:?}", outcome);
    };
    assert_eq!(loaded.rom.id.xmlid, "A4TF400E");
    assert_eq!(loaded.image.len(), 0x1000);
    assert_eq!(loaded.checksum, Some(ChecksumOutcome::Invalid(1)));

    let percents = sink.percents();
    assert_eq!(percents.first(), Some(&0));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    let phases = sink.phases();
    for phase in [
        Phase::ReadingImage,
        Phase::FindingDefinition,
        Phase::Populating,
        Phase::Finalizing,
        Phase::ValidatingChecksum,
        Phase::Done,
    ] {
        assert!(phases.contains(&phase), "missing phase {:?}", phase);
    }
}

#[test]
fn test_loaded_tables_are_populated() {
    let Some(candidates) = sample_candidates() else {
        return;
    };
    let mut image = sample_image();
    image[0x300..0x302].copy_from_slice(&7000u16.to_be_bytes());
    image[0x380..0x384].copy_from_slice(&0.5f32.to_be_bytes());

    let loaded = ImageLoader::default()
        .load_bytes(image, &candidates, &NoProgress)
        .unwrap()
        .loaded()
        .unwrap();
    assert_eq!(loaded.rom.table("Rev Limit").unwrap().values, [7000.0]);
    let fuel = loaded.rom.table("Primary Fuel Map").unwrap();
    assert_eq!(fuel.values.len(), 12);
    assert_eq!(fuel.axes[0].values[0], 0.5);
    // switch tables carry states, not values
    assert!(loaded.rom.checksum_table().unwrap().values.is_empty());
}

#[test]
fn test_checksum_repair_round_trip() {
    let Some(candidates) = sample_candidates() else {
        return;
    };
    let mut loaded = ImageLoader::default()
        .load_bytes(sample_image(), &candidates, &NoProgress)
        .unwrap()
        .loaded()
        .unwrap();
    assert!(!loaded.checksum.unwrap().is_valid());

    assert!(loaded.update_checksum().unwrap());
    assert_eq!(loaded.checksum, Some(ChecksumOutcome::AllValid));

    // tamper inside the second segment
    loaded.image[0x250] ^= 0xFF;
    assert_eq!(
        loaded.rom.validate_checksum(&loaded.image).unwrap(),
        Some(ChecksumOutcome::Invalid(2))
    );

    // disable every record through the "off" state
    let off = loaded.rom.checksum_table().unwrap().states[1].data.clone();
    loaded.image[REGION..REGION + 12].copy_from_slice(&off);
    assert_eq!(
        loaded.rom.validate_checksum(&loaded.image).unwrap(),
        Some(ChecksumOutcome::AllDisabled)
    );
    assert_eq!(
        loaded
            .rom
            .checksum_table()
            .unwrap()
            .current_state(&loaded.image)
            .map(|s| s.name.as_str()),
        Some("off")
    );
}

#[test]
fn test_rom_rejects_foreign_image() {
    let Some(candidates) = sample_candidates() else {
        return;
    };
    let loaded = ImageLoader::default()
        .load_bytes(sample_image(), &candidates, &NoProgress)
        .unwrap()
        .loaded()
        .unwrap();

    let shorter = vec![0u8; 0x800];
    assert!(matches!(
        loaded.rom.validate_checksum(&shorter),
        Err(RomError::ImageMismatch { .. })
    ));

    let mut relabelled = loaded.image.clone();
    relabelled[SAMPLE_ROM_ID_ADDRESS] = b'X';
    let mut writable = relabelled.clone();
    assert!(matches!(
        loaded.rom.update_checksum(&mut writable),
        Err(RomError::ImageMismatch { .. })
    ));
    assert_eq!(writable, relabelled);
}

#[test]
fn test_rom_json_round_trip() {
    let Some(candidates) = sample_candidates() else {
        return;
    };
    let loaded = ImageLoader::default()
        .load_bytes(sample_image(), &candidates, &NoProgress)
        .unwrap()
        .loaded()
        .unwrap();
    let json = loaded.rom.to_json_string().unwrap();
    assert!(json.contains("\"xmlid\":\"A4TF400E\""));
    let back = Rom::from_json_str(&json).unwrap();
    assert_eq!(back, loaded.rom);
}

#[test]
fn test_oversized_image_file_is_resource_exhausted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.bin");
    std::fs::write(&path, vec![0u8; 4096]).unwrap();

    let mut config = LoaderConfig::default();
    config.io.max_image_size = 1024;
    let err = ImageLoader::new(config)
        .load_path(&path, &[], &NoProgress)
        .unwrap_err();
    assert!(err.is_resource_exhausted());
}

#[tokio::test]
async fn test_background_load_reaches_done() {
    let Some(candidates) = sample_candidates() else {
        return;
    };
    let sink = Arc::new(RecordingSink::default());
    let outcome = load_in_background(
        LoadRequest::from_bytes(sample_image(), candidates),
        sink.clone(),
        CancelFlag::new(),
        Some(TimeoutConfig::new(60)),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, LoadOutcome::Loaded(_)));
    assert_eq!(sink.percents().last(), Some(&100));
}

#[tokio::test]
async fn test_background_load_from_path_can_be_cancelled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("image.bin");
    std::fs::write(&path, vec![0u8; 64]).unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let outcome = load_in_background(
        LoadRequest::from_path(&path, vec![native("x.xml", &rom_xml("X", 0, "X", ""))]),
        Arc::new(NoProgress),
        cancel,
        None,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, LoadOutcome::Cancelled));
}
