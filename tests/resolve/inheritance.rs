//! Rom and table inheritance through `base` references.

use romdef::loader::{ImageLoader, LoadOutcome};
use romdef::model::{BuildOutcome, ModelBuilder, StorageType, TableKind};
use romdef::progress::NoProgress;
use romdef::resolver::{DefinitionResolver, Resolution};
use romdef::{DefinitionCandidate, DefinitionNormalizer, RomError};

use crate::common::test_data::*;
use crate::common::*;

fn sample_image() -> Vec<u8> {
    image_with_id(0x1000, SAMPLE_ROM_ID_ADDRESS, SAMPLE_ROM_ID)
}

#[test]
fn test_sample_definition_merges_base_rom() {
    if !sample_file_exists(SAMPLE_NATIVE_DEFS) {
        println!("Skipping {} - file not found", SAMPLE_NATIVE_DEFS);
        return;
    }
    let candidate = DefinitionCandidate::from_path(sample_file_path(SAMPLE_NATIVE_DEFS));
    let rom = DefinitionResolver::default()
        .resolve(&sample_image(), &[candidate], &NoProgress)
        .unwrap()
        .into_rom()
        .expect("sample rom should match");

    // child fields
    assert_eq!(rom.id.xmlid, "A4TF400E");
    assert_eq!(rom.id.ecu_id.as_deref(), Some("2F12785606"));
    assert_eq!(rom.id.year.as_deref(), Some("05"));
    // inherited from BASE_A4TF
    assert_eq!(rom.id.ram_offset, 0xFF_0000);
    assert_eq!(rom.id.make.as_deref(), Some("Subaru"));
    assert_eq!(rom.id.mem_model.as_deref(), Some("SH7055"));

    let fuel = rom.table("Primary Fuel Map").unwrap();
    assert_eq!(fuel.kind, TableKind::ThreeD);
    assert_eq!(fuel.file_offset(), 0x500);
    assert_eq!(fuel.storage_type, StorageType::UInt16);
    assert_eq!(fuel.data_size, 4 * 3 * 2);
    assert_eq!(fuel.axes.len(), 2);
    assert_eq!(fuel.axes[1].name, "Engine Speed");
    assert_eq!(fuel.axes[1].file_offset(), 0x3A0);

    let rev = rom.table("Rev Limit").unwrap();
    assert_eq!(rev.storage_type, StorageType::UInt16);
    assert_eq!(rev.category.as_deref(), Some("Engine"));
    assert!(rom.table("Rev Limit Template").is_none());

    let fix = rom.checksum_table().unwrap();
    assert_eq!(fix.data_size, 36);
    assert_eq!(fix.states.len(), 2);
}

#[test]
fn test_sibling_rom_is_skipped_in_document_order() {
    if !sample_file_exists(SAMPLE_NATIVE_DEFS) {
        return;
    }
    let image = image_with_id(0x1000, SAMPLE_ROM_ID_ADDRESS, b"A4TF500F");
    let candidate = DefinitionCandidate::from_path(sample_file_path(SAMPLE_NATIVE_DEFS));
    let rom = DefinitionResolver::default()
        .resolve(&image, &[candidate], &NoProgress)
        .unwrap()
        .into_rom()
        .unwrap();
    assert_eq!(rom.id.xmlid, "A4TF500F");
    // no overrides: base address of the fuel map
    assert_eq!(rom.table("Primary Fuel Map").unwrap().file_offset(), 0x400);
}

#[test]
fn test_three_level_rom_chain() {
    let xml = r#"<roms>
  <rom><romid><xmlid>ROOT</xmlid><ramoffset>100</ramoffset></romid>
    <table name="Timing" storageaddress="0x110" storagetype="int8" sizex="2"/>
  </rom>
  <rom base="ROOT"><romid><xmlid>MID</xmlid><make>Subaru</make></romid>
    <table name="Timing" sizex="4"/>
  </rom>
  <rom base="MID"><romid><xmlid>LEAF</xmlid>
    <internalidaddress>0</internalidaddress><internalidstring>0x4C454146</internalidstring></romid>
    <table name="Timing" storageaddress="0x120"/>
  </rom>
</roms>"#;
    let image = image_with_id(0x40, 0, b"LEAF");
    let rom = DefinitionResolver::default()
        .resolve(&image, &[native("chain.xml", xml)], &NoProgress)
        .unwrap()
        .into_rom()
        .unwrap();

    assert_eq!(rom.id.xmlid, "LEAF");
    assert_eq!(rom.id.make.as_deref(), Some("Subaru"));
    let timing = rom.table("Timing").unwrap();
    assert_eq!(timing.size_x, 4);
    assert_eq!(timing.storage_type, StorageType::Int8);
    assert_eq!(timing.file_offset(), 0x20);
}

#[test]
fn test_table_cycle_is_reported_with_chain() {
    let tables = r#"
    <table name="Alpha" base="Beta" storageaddress="0x10"/>
    <table name="Beta" base="Gamma"/>
    <table name="Gamma" base="Alpha"/>"#;
    let xml = rom_xml("CYC", 0, "CYC", tables);
    let resolution = DefinitionResolver::default()
        .resolve(&image_with_id(0x40, 0, b"CYC"), &[native("tables.xml", &xml)], &NoProgress)
        .unwrap();
    match resolution {
        Resolution::Aborted(err @ RomError::CyclicInheritance { .. }) => {
            assert_eq!(
                err.to_string(),
                "Looped inheritance in tables.xml: Alpha -> Beta -> Gamma -> Alpha"
            );
        }
        other => panic!("expected cyclic inheritance, got {:?}", other),
    }
}

#[test]
fn test_missing_base_rom_rejects_candidate() {
    let xml = r#"<roms><rom base="NOWHERE"><romid><xmlid>ORPHAN</xmlid>
        <internalidaddress>0</internalidaddress><internalidstring>ORPH</internalidstring></romid></rom></roms>"#;
    let image = image_with_id(0x40, 0, b"ORPH");
    let candidates = vec![
        native("orphan.xml", xml),
        native("fallback.xml", &rom_xml("FALLBACK", 0, "ORPH", "")),
    ];
    let rom = DefinitionResolver::default()
        .resolve(&image, &candidates, &NoProgress)
        .unwrap()
        .into_rom()
        .unwrap();
    assert_eq!(rom.id.xmlid, "FALLBACK");
}

#[test]
fn test_builder_consumes_normalized_tree() {
    let xml = rom_xml(
        "DIRECT",
        4,
        "DRCT",
        r#"<table name="Map" storageaddress="8" storagetype="float"/>"#,
    );
    let tree = DefinitionNormalizer::default()
        .normalize(&native("direct.xml", &xml))
        .unwrap();
    let image = image_with_id(0x10, 4, b"DRCT");
    match ModelBuilder::default().build(tree, &image).unwrap() {
        BuildOutcome::Matched(rom) => {
            assert_eq!(rom.candidate, "direct.xml");
            assert_eq!(rom.image_len, 0x10);
        }
        BuildOutcome::NoMatch => panic!("expected a match"),
    }
}

#[test]
fn test_child_matched_by_size_stays_bound_despite_base_id() {
    let xml = r#"<roms>
  <rom><romid><xmlid>PARENT</xmlid>
    <internalidaddress>0</internalidaddress><internalidstring>PRNT</internalidstring></romid>
    <table name="Limit" storageaddress="0x10" storagetype="uint16"/>
  </rom>
  <rom base="PARENT"><romid><xmlid>SIZED</xmlid><filesize>64b</filesize></romid></rom>
</roms>"#;
    let mut image = vec![0u8; 64];
    image[0x10..0x12].copy_from_slice(&6500u16.to_be_bytes());

    let outcome = ImageLoader::default()
        .load_bytes(image.clone(), &[native("sized.xml", xml)], &NoProgress)
        .unwrap();
    let LoadOutcome::Loaded(loaded) = outcome else {
        panic!("expected a loaded image, got {:?}", outcome);
    };
    // the merged id carries the parent's id string, the binding does not
    assert_eq!(loaded.rom.id.internal_id_string.as_deref(), Some("PRNT"));
    assert_eq!(loaded.rom.match_id.file_size, Some(64));
    assert_eq!(loaded.rom.table("Limit").unwrap().values, [6500.0]);
    assert!(loaded.rom.ensure_bound(&image).is_ok());
}
