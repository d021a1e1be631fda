//! Candidate search: skip, reject, abort, cancel.

use romdef::progress::{CancelFlag, NoProgress, Phase, ResolveEvent};
use romdef::resolver::{DefinitionResolver, Resolution};
use romdef::{LoaderConfig, RomError};
use tempfile::TempDir;

use crate::common::*;

const ID_ADDRESS: usize = 0x40;

fn image() -> Vec<u8> {
    image_with_id(0x200, ID_ADDRESS, b"EJ20K123")
}

fn matching_xml() -> String {
    rom_xml(
        "EJ20K123",
        ID_ADDRESS,
        "EJ20K123",
        r#"<table type="1D" name="Idle Target" storageaddress="0x100" storagetype="uint16"/>"#,
    )
}

fn other_xml() -> String {
    rom_xml("EJ25X999", ID_ADDRESS, "EJ25X999", "")
}

fn cyclic_xml() -> String {
    format!(
        r#"<roms>
  <rom base="LOOP_B">
    <romid><xmlid>LOOP_A</xmlid><internalidaddress>{:x}</internalidaddress><internalidstring>EJ20K123</internalidstring></romid>
  </rom>
  <rom base="LOOP_A"><romid><xmlid>LOOP_B</xmlid></romid></rom>
</roms>"#,
        ID_ADDRESS
    )
}

#[test]
fn test_missing_then_matching_is_found() {
    let dir = TempDir::new().unwrap();
    let candidates = vec![
        missing_candidate(dir.path()),
        write_candidate(dir.path(), "match.xml", &matching_xml()),
    ];
    let sink = RecordingSink::default();

    let resolution = DefinitionResolver::default()
        .resolve(&image(), &candidates, &sink)
        .unwrap();

    let Resolution::Found(rom) = resolution else {
        panic!("expected a match, got {:?}", resolution);
    };
    assert_eq!(rom.id.xmlid, "EJ20K123");
    assert!(rom.candidate.ends_with("match.xml"));
    assert_eq!(rom.table("Idle Target").unwrap().file_offset(), 0x100);

    let events = sink.events();
    assert!(matches!(events[0], ResolveEvent::CandidateMissing { .. }));
    assert!(matches!(events[1], ResolveEvent::Matched { ref xmlid, .. } if xmlid == "EJ20K123"));
}

#[test]
fn test_missing_nonmatching_cyclic_aborts() {
    let dir = TempDir::new().unwrap();
    let candidates = vec![
        missing_candidate(dir.path()),
        write_candidate(dir.path(), "other.xml", &other_xml()),
        write_candidate(dir.path(), "cyclic.xml", &cyclic_xml()),
        write_candidate(dir.path(), "match.xml", &matching_xml()),
    ];
    let sink = RecordingSink::default();

    let resolution = DefinitionResolver::default()
        .resolve(&image(), &candidates, &sink)
        .unwrap();

    match resolution {
        Resolution::Aborted(RomError::CyclicInheritance { candidate, chain }) => {
            assert!(candidate.ends_with("cyclic.xml"));
            assert_eq!(chain, ["LOOP_A", "LOOP_B", "LOOP_A"]);
        }
        other => panic!("expected cyclic abort, got {:?}", other),
    }

    let events = sink.events();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], ResolveEvent::CandidateMissing { .. }));
    assert!(matches!(events[1], ResolveEvent::CandidateRejected { .. }));
    assert!(matches!(events[2], ResolveEvent::Aborted { .. }));
}

#[test]
fn test_malformed_definition_aborts_whole_search() {
    let candidates = vec![
        native("broken.xml", "<roms><rom><romid></rom></roms>"),
        native("match.xml", &matching_xml()),
    ];
    let resolution = DefinitionResolver::default()
        .resolve(&image(), &candidates, &NoProgress)
        .unwrap();
    match resolution {
        Resolution::Aborted(RomError::MalformedDefinition { candidate, .. }) => {
            assert_eq!(candidate, "broken.xml");
        }
        other => panic!("expected malformed abort, got {:?}", other),
    }
}

#[test]
fn test_table_outside_image_aborts() {
    let xml = rom_xml(
        "EJ20K123",
        ID_ADDRESS,
        "EJ20K123",
        r#"<table name="Beyond" storageaddress="0x1FF" storagetype="uint32"/>"#,
    );
    let resolution = DefinitionResolver::default()
        .resolve(&image(), &[native("far.xml", &xml)], &NoProgress)
        .unwrap();
    assert!(matches!(
        resolution,
        Resolution::Aborted(RomError::OutOfRange(_))
    ));
}

#[test]
fn test_empty_and_nonmatching_lists_are_not_found() {
    let resolver = DefinitionResolver::default();
    assert!(matches!(
        resolver.resolve(&image(), &[], &NoProgress).unwrap(),
        Resolution::NotFound
    ));
    assert!(matches!(
        resolver
            .resolve(&image(), &[native("other.xml", &other_xml())], &NoProgress)
            .unwrap(),
        Resolution::NotFound
    ));
}

#[test]
fn test_search_progress_stays_within_search_band() {
    let candidates = vec![
        native("a.xml", &other_xml()),
        native("b.xml", &other_xml()),
        native("c.xml", &other_xml()),
        native("d.xml", &other_xml()),
    ];
    let sink = RecordingSink::default();
    DefinitionResolver::default()
        .resolve(&image(), &candidates, &sink)
        .unwrap();

    assert_eq!(sink.percents(), [10, 20, 30, 40, 50]);
    assert!(sink.phases().iter().all(|p| *p == Phase::FindingDefinition));
}

#[test]
fn test_cancel_flag_stops_search() {
    let cancel = CancelFlag::new();
    let resolver = DefinitionResolver::default().with_cancel_flag(cancel.clone());
    cancel.cancel();
    let resolution = resolver
        .resolve(&image(), &[native("match.xml", &matching_xml())], &NoProgress)
        .unwrap();
    assert!(matches!(resolution, Resolution::Cancelled));
}

#[test]
fn test_definition_size_limit_is_an_error() {
    let mut config = LoaderConfig::default();
    config.io.max_definition_size = 64;
    let dir = TempDir::new().unwrap();
    let candidates = vec![write_candidate(dir.path(), "match.xml", &matching_xml())];

    let err = DefinitionResolver::new(&config)
        .resolve(&image(), &candidates, &NoProgress)
        .unwrap_err();
    assert!(err.is_resource_exhausted());
}
