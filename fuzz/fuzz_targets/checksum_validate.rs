#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let address = i32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64;
    let size = u16::from_be_bytes([data[4], data[5]]) as usize;
    let ram_offset = i16::from_be_bytes([data[6], data[7]]) as i64;
    let mut image = data[8..].to_vec();
    let _ = romdef::checksum::validate(&image, address, size, ram_offset);
    let _ = romdef::checksum::calculate(&mut image, address, size, ram_offset);
});
