//! Scenario: case metadata set before acquisition survives a real
//! write -> finalize -> close -> reopen cycle through the `header`/`header2`
//! framings, including the tab-separated `acquiry_date` wire form getting
//! rendered back into a human date string on request.

mod support;

use exhume_ewf::{CompressionLevel, DateFormat, EwfHandle, Format};
use tempfile::tempdir;

#[test]
fn header_values_round_trip_through_a_closed_segment() {
    let _ = env_logger::try_init();
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 64, 512, CompressionLevel::None).unwrap();
    writer.set_case_number("case-42").unwrap();
    writer.set_examiner_name("jdoe").unwrap();
    writer.set_header_value("acquiry_date", "2026 7 29 10 15 0").unwrap();

    writer.write(&vec![0u8; 512]).unwrap();
    writer.finalize().unwrap();
    drop(writer);

    let first_segment = dir.path().join("image.E01");
    let reader = EwfHandle::open(&[&first_segment]).unwrap();

    assert_eq!(reader.case_number(), Some("case-42"));
    assert_eq!(reader.examiner_name(), Some("jdoe"));
    assert_eq!(reader.header_value("acquiry_date"), Some("2026 7 29 10 15 0"));

    let rendered = reader.parse_header_values(DateFormat::Iso8601);
    assert_eq!(rendered.get("case_number"), Some("case-42"));
    assert_eq!(rendered.get("acquiry_date"), Some("2026-07-29T10:15:00"));
}

#[test]
fn hash_values_round_trip_through_finalize() {
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 64, 512, CompressionLevel::None).unwrap();
    writer.push_digest(Box::new(support::Md5Digest::new()));
    writer.write(&vec![0u8; 512]).unwrap();
    writer.finalize().unwrap();
    let md5_hex = support::hex(writer.md5().unwrap());
    drop(writer);

    let first_segment = dir.path().join("image.E01");
    let reader = EwfHandle::open(&[&first_segment]).unwrap();
    let hashes = reader.parse_hash_values();
    assert_eq!(hashes.get("MD5").map(str::to_lowercase), Some(md5_hex));
}
