//! Scenario: media size is unknown at `create` time (a live streaming
//! acquisition). `finalize` must back-fill `number_of_sectors`/`media_size`
//! from the observed tally and rewrite the `volume` section in place.

mod support;

use exhume_ewf::{CompressionLevel, EwfHandle, Format};
use std::io::Read;
use tempfile::tempdir;

#[test]
fn unknown_size_write_backfills_volume_on_finalize() {
    let _ = env_logger::try_init();
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 128, 512, CompressionLevel::None).unwrap();
    assert_eq!(writer.number_of_sectors(), 0);

    let chunk = vec![0u8; 65536];
    for _ in 0..3 {
        writer.write(&chunk).unwrap();
    }
    writer.finalize().unwrap();

    let expected_size = chunk.len() as u64 * 3;
    assert_eq!(writer.media_size(), expected_size);
    assert_eq!(writer.number_of_sectors(), expected_size / 512);

    let first_segment = dir.path().join("image.E01");
    let raw = std::fs::read(&first_segment).unwrap();
    let (volume_offset, _) = support::find_section(&raw, "volume").unwrap();
    let stored_number_of_sectors = u64::from_le_bytes(raw[volume_offset + 16..volume_offset + 24].try_into().unwrap());
    assert_eq!(stored_number_of_sectors, expected_size / 512);

    let mut reader = EwfHandle::open(&[&first_segment]).unwrap();
    assert_eq!(reader.media_size(), expected_size);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf.len(), expected_size as usize);
    assert!(buf.iter().all(|&b| b == 0));
}
