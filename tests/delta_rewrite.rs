//! Scenario: rewriting a chunk of an already-finalized acquisition goes to
//! a delta (`.d01`) file rather than touching the base segment, and the
//! rewritten chunk reads back as an override while the original segment's
//! bytes are untouched.

mod support;

use exhume_ewf::{ChunkFlags, CompressionLevel, EwfHandle, Format};
use std::io::{Read, Seek, SeekFrom};
use tempfile::tempdir;

#[test]
fn rewriting_a_chunk_creates_a_delta_segment_and_leaves_the_base_untouched() {
    let _ = env_logger::try_init();
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 128, 512, CompressionLevel::None).unwrap();
    let chunk_size = writer.sectors_per_chunk() as usize * writer.bytes_per_sector() as usize;
    let original: Vec<u8> = (0..10u32)
        .flat_map(|i| vec![i as u8; chunk_size])
        .collect();
    writer.write(&original).unwrap();
    writer.finalize().unwrap();

    let first_segment = dir.path().join("image.E01");
    let original_bytes = std::fs::read(&first_segment).unwrap();

    let mut handle = EwfHandle::open(&[&first_segment]).unwrap();
    let replacement = vec![0xAAu8; chunk_size];
    handle.rewrite_chunk(5, &replacement).unwrap();

    let delta_segment = dir.path().join("image.d01");
    assert!(delta_segment.exists(), "rewrite_chunk should create a .d01 delta segment");
    assert_eq!(
        std::fs::read(&first_segment).unwrap(),
        original_bytes,
        "a delta rewrite must never touch the base segment's bytes"
    );

    let descriptor = handle.chunk_descriptor(5).unwrap();
    assert!(descriptor.flags.contains(ChunkFlags::DELTA));

    handle.seek(SeekFrom::Start(5 * chunk_size as u64)).unwrap();
    let mut buf = vec![0u8; chunk_size];
    handle.read_exact(&mut buf).unwrap();
    assert_eq!(buf, replacement);

    // Chunks on either side of the rewritten one are unaffected.
    handle.seek(SeekFrom::Start(4 * chunk_size as u64)).unwrap();
    let mut neighbor = vec![0u8; chunk_size];
    handle.read_exact(&mut neighbor).unwrap();
    assert_eq!(neighbor, vec![4u8; chunk_size]);
}
