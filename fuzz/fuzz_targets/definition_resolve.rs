#![no_main]
use libfuzzer_sys::fuzz_target;
use romdef::progress::NoProgress;
use romdef::{DefinitionCandidate, DefinitionResolver, Dialect};

fuzz_target!(|data: &[u8]| {
    let image = [0u8; 256];
    let candidates = [
        DefinitionCandidate::from_bytes("fuzz.xml", data.to_vec(), Dialect::Native),
        DefinitionCandidate::from_bytes("fuzz.xdf", data.to_vec(), Dialect::TunerProXdf),
    ];
    let _ = DefinitionResolver::default().resolve(&image, &candidates, &NoProgress);
});
