//! Scenario: `compression_level = none` but `compress_empty_block = true`
//! still deflates an all-zero chunk — a small compressed block is cheaper
//! to store than the chunk plus its trailing CRC, and it still round-trips
//! as the same zero-filled plaintext.

mod support;

use exhume_ewf::{ChunkFlags, CompressionLevel, EwfHandle, Format};
use std::io::Read;
use tempfile::tempdir;

#[test]
fn empty_chunk_is_compressed_even_at_compression_level_none() {
    let _ = env_logger::try_init();
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 64, 512, CompressionLevel::None).unwrap();
    assert!(writer.compress_empty_block());

    let chunk_size = writer.sectors_per_chunk() as usize * writer.bytes_per_sector() as usize;
    writer.write(&vec![0u8; chunk_size]).unwrap();
    writer.finalize().unwrap();

    let first_segment = dir.path().join("image.E01");
    let mut reader = EwfHandle::open(&[&first_segment]).unwrap();
    let descriptor = reader.chunk_descriptor(0).unwrap();
    assert!(descriptor.flags.contains(ChunkFlags::COMPRESSED));
    // The compressed representation of an all-zero chunk is far smaller
    // than the chunk itself plus its would-be 4-byte CRC.
    assert!((descriptor.size as usize) < chunk_size / 4);

    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, vec![0u8; chunk_size]);
}

#[test]
fn disabling_compress_empty_block_stores_raw_plus_crc() {
    let dir = tempdir().unwrap();
    let basename = dir.path().join("image");

    let mut writer = EwfHandle::create(basename, Format::Ewf, 64, 512, CompressionLevel::None).unwrap();
    writer.set_compress_empty_block(false).unwrap();
    let chunk_size = writer.sectors_per_chunk() as usize * writer.bytes_per_sector() as usize;
    writer.write(&vec![0u8; chunk_size]).unwrap();
    writer.finalize().unwrap();

    let first_segment = dir.path().join("image.E01");
    let reader = EwfHandle::open(&[&first_segment]).unwrap();
    let descriptor = reader.chunk_descriptor(0).unwrap();
    assert!(!descriptor.flags.contains(ChunkFlags::COMPRESSED));
    assert_eq!(descriptor.size as usize, chunk_size + 4);
}
