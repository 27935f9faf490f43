//! Scenario: a tight segment-size target forces several rollovers across
//! one acquisition, and a re-open reconstructs one continuous chunk space
//! from the resulting `.E01`, `.E02`, … sequence.

mod support;

use exhume_ewf::{CompressionLevel, EwfHandle, Format};
use std::io::Read;
use tempfile::tempdir;

#[test]
fn exact_rollover_spans_several_segments() {
    let _ = env_logger::try_init();
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 128, 512, CompressionLevel::None).unwrap();
    assert_eq!(writer.sectors_per_chunk() as u64 * writer.bytes_per_sector() as u64, 65536);
    writer.set_segment_file_size(1024 * 1024).unwrap();

    let pattern: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
    let total_chunks = 128; // 8 MiB / 64 KiB chunks
    for _ in 0..total_chunks {
        writer.write(&pattern).unwrap();
    }
    writer.finalize().unwrap();

    assert_eq!(writer.media_size(), pattern.len() as u64 * total_chunks as u64);

    let mut segment_paths = Vec::new();
    for n in 1.. {
        let path = dir.path().join(format!("image.E{n:02}"));
        if !path.exists() {
            break;
        }
        segment_paths.push(path);
    }
    assert!(
        segment_paths.len() > 1,
        "a 1 MiB segment target over an 8 MiB write should roll over at least once"
    );

    let mut reader = EwfHandle::open(&segment_paths).unwrap();
    assert_eq!(reader.media_size(), pattern.len() as u64 * total_chunks as u64);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf.len(), pattern.len() * total_chunks as usize);
    for chunk in buf.chunks(pattern.len()) {
        assert_eq!(chunk, pattern.as_slice());
    }
}
