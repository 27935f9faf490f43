//! Delta chunk rewrites (spec §4.7): after an image has been finalized,
//! a correction to one chunk's plaintext is never applied in place —
//! it is appended to a DWF delta segment as a `delta_chunk` section, and
//! the chunk's offset-table entry is updated to point there with
//! [`ChunkFlags::DELTA`] set. The original EWF/EWFX segment bytes are
//! left untouched, so the evidence chain for the base acquisition stays
//! intact even as corrections accumulate.

use crate::ewf::codec::adler32;
use crate::ewf::error::{Error, Result};
use crate::ewf::io_pool::FileIoPool;
use crate::ewf::offset_table::{ChunkDescriptor, ChunkFlags, OffsetTable};
use crate::ewf::section::SectionType;
use crate::ewf::segment_file::{self, FILE_HEADER_SIZE, SegmentFileType};
use crate::ewf::segment_table::DeltaSegmentTable;

/// Above this size a delta segment is considered full and the next
/// rewrite starts a fresh DWF instead of appending to it — keeps any
/// single delta file from growing without bound across a long
/// correction history.
pub const DEFAULT_MAX_DELTA_SEGMENT_SIZE: u64 = 650 * 1024 * 1024;

/// Build a `delta_chunk` section payload: `chunk_number` (u64 LE),
/// `plaintext`, then a trailing Adler-32 over `plaintext` alone — the
/// same checksum convention an uncompressed ordinary chunk uses.
pub fn build_delta_chunk_payload(chunk_number: u64, plaintext: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + plaintext.len() + 4);
    buf.extend_from_slice(&chunk_number.to_le_bytes());
    buf.extend_from_slice(plaintext);
    let checksum = adler32(plaintext);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// Split a parsed `delta_chunk` body (as [`crate::ewf::segment_file::ParsedSegment::delta_chunks`]
/// returns it, already stripped of its leading chunk number) back into
/// validated plaintext.
pub fn parse_delta_chunk_body(body: &[u8]) -> Result<Vec<u8>> {
    if body.len() < 4 {
        return Err(Error::CorruptSection("delta chunk body truncated".into()));
    }
    let split = body.len() - 4;
    let stored = crate::ewf::codec::read_u32(body, split)?;
    let computed = adler32(&body[..split]);
    if stored != computed {
        return Err(Error::ChecksumMismatch {
            context: "delta chunk".into(),
            expected: stored,
            computed,
        });
    }
    Ok(body[..split].to_vec())
}

/// Ensure a brand-new delta segment file has its 13-byte header written
/// before the first `delta_chunk` section lands in it.
fn ensure_header_written(pool: &mut FileIoPool, delta_segments: &DeltaSegmentTable, index: u32) -> Result<()> {
    let entry = delta_segments.get(index)?;
    if pool.len(entry.pool_handle)? == 0 {
        segment_file::write_file_header(
            pool,
            entry.pool_handle,
            SegmentFileType::Dwf,
            entry.segment_number as u16,
        )?;
    }
    Ok(())
}

/// Append a corrected `plaintext` for `chunk_idx` to the active delta
/// segment (starting a new one if the active one has grown past
/// `max_delta_segment_size`), then repoint `offset_table`'s entry at it
/// with [`ChunkFlags::DELTA`] set.
pub fn rewrite_chunk(
    pool: &mut FileIoPool,
    delta_segments: &mut DeltaSegmentTable,
    offset_table: &mut OffsetTable,
    chunk_idx: u64,
    plaintext: &[u8],
    max_delta_segment_size: u64,
) -> Result<()> {
    let mut index = delta_segments.ensure_active(pool);
    ensure_header_written(pool, delta_segments, index)?;

    let active_len = pool.len(delta_segments.get(index)?.pool_handle)?;
    if active_len >= max_delta_segment_size {
        index = delta_segments.start_new(pool);
        ensure_header_written(pool, delta_segments, index)?;
    }

    let entry_handle = delta_segments.get(index)?.pool_handle;
    let write_offset = pool.len(entry_handle)?.max(FILE_HEADER_SIZE);

    let payload = build_delta_chunk_payload(chunk_idx, plaintext);
    // Terminate the segment with a fresh `next`/`done` pair after every
    // rewrite rather than tracking an open section across calls — delta
    // segments are small and rewritten rarely enough that the extra
    // 76 bytes per call is not worth the bookkeeping.
    let next_offset = write_offset + segment_file_descriptor_size() + payload.len() as u64;
    let after_chunk = segment_file::write_section(
        pool,
        entry_handle,
        write_offset,
        SectionType::DeltaChunk,
        &payload,
        next_offset,
    )?;

    let terminator_offset = after_chunk;
    segment_file::write_section(
        pool,
        entry_handle,
        terminator_offset,
        SectionType::Done,
        &[],
        terminator_offset,
    )?;

    offset_table.insert(
        chunk_idx,
        ChunkDescriptor {
            segment_index: index,
            file_offset: write_offset + segment_file_descriptor_size() + 8,
            size: plaintext.len() as u32 + 4,
            flags: ChunkFlags::DELTA,
        },
    );
    Ok(())
}

fn segment_file_descriptor_size() -> u64 {
    crate::ewf::section::SECTION_DESCRIPTOR_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn delta_chunk_payload_round_trips() {
        let payload = build_delta_chunk_payload(42, b"replacement sector data");
        let chunk_number = u64::from_le_bytes(payload[0..8].try_into().unwrap());
        assert_eq!(chunk_number, 42);
        let recovered = parse_delta_chunk_body(&payload[8..]).unwrap();
        assert_eq!(recovered, b"replacement sector data");
    }

    #[test]
    fn rewrite_chunk_updates_offset_table_with_delta_flag() {
        let dir = tempdir().unwrap();
        let mut pool = FileIoPool::new(4);
        let mut delta_segments = DeltaSegmentTable::new(dir.path().join("image"));
        let mut offset_table = OffsetTable::new();

        rewrite_chunk(
            &mut pool,
            &mut delta_segments,
            &mut offset_table,
            5,
            b"new plaintext for chunk five",
            DEFAULT_MAX_DELTA_SEGMENT_SIZE,
        )
        .unwrap();

        let descriptor = offset_table.lookup(5).unwrap();
        assert!(descriptor.is_delta());
        assert!(!delta_segments.is_empty());
    }
}
