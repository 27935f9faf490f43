//! Scenario: a single-chunk, uncompressed acquisition — the smallest
//! acquisition the engine can produce end to end (create, write, finalize,
//! re-open, read, verify the MD5).

mod support;

use exhume_ewf::{CompressionLevel, EwfHandle, Format};
use std::io::Read;
use tempfile::tempdir;

#[test]
fn one_chunk_image_round_trips_and_hashes() {
    let _ = env_logger::try_init();
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 64, 512, CompressionLevel::None).unwrap();
    writer.set_case_number("2026-001").unwrap();
    writer.push_digest(Box::new(support::Md5Digest::new()));

    let zeros = vec![0u8; 512];
    writer.write(&zeros).unwrap();
    writer.finalize().unwrap();

    assert_eq!(support::hex(writer.md5().unwrap()), "bf619eac0cdf3f68d496ea9344137e8b");

    let first_segment = dir.path().join("image.E01");
    assert!(first_segment.exists());
    let raw = std::fs::read(&first_segment).unwrap();

    assert!(support::find_section(&raw, "header").is_some());
    assert!(support::find_section(&raw, "volume").is_some());
    let (sectors_offset, sectors_len) = support::find_section(&raw, "sectors").unwrap();
    // 512 bytes of plaintext plus the trailing 4-byte Adler-32 CRC, since
    // this chunk was written uncompressed.
    assert_eq!(sectors_len, 512 + 4);
    assert!(raw[sectors_offset..sectors_offset + 512].iter().all(|&b| b == 0));
    assert!(support::find_section(&raw, "table").is_some());
    assert!(support::find_section(&raw, "table2").is_some());
    assert!(support::find_section(&raw, "hash").is_some());
    assert!(support::find_section(&raw, "done").is_some());

    let mut reader = EwfHandle::open(&[&first_segment]).unwrap();
    assert_eq!(reader.media_size(), 512);
    assert_eq!(reader.case_number(), Some("2026-001"));
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, vec![0u8; 512]);
}
