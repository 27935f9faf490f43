//! The segment-file engine (spec §4.3, §4.4): parses one segment's file
//! header and section chain on read, and exposes the low-level primitives
//! the write planner ([`crate::ewf::write_io`]) sequences into a valid
//! segment on write. Chunk rollover policy itself lives in `write_io`;
//! this module only knows how to lay out and recognize sections.

use crate::ewf::codec::adler32;
use crate::ewf::error::{Error, Result};
use crate::ewf::format::CompressionLevel;
use crate::ewf::hash_section;
use crate::ewf::io_pool::{FileIoPool, PoolHandle};
use crate::ewf::media_values::MediaValues;
use crate::ewf::offset_table::OffsetTable;
use crate::ewf::sector_table::SectorRangeTable;
use crate::ewf::section::{SectionDescriptor, SectionList, SectionType, SECTION_DESCRIPTOR_SIZE};
use crate::ewf::table_section;
use crate::ewf::values::{self, ValueTable};

pub const FILE_HEADER_SIZE: u64 = 13;

/// Which chassis a segment file belongs to: a base acquisition segment,
/// a logical-evidence-file segment (shares the chassis, spec §1), or a
/// delta-write file holding chunk overrides (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFileType {
    Ewf,
    Lwf,
    Dwf,
}

impl SegmentFileType {
    fn magic(self) -> [u8; 8] {
        match self {
            SegmentFileType::Ewf => [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00],
            SegmentFileType::Lwf => [0x4c, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00],
            SegmentFileType::Dwf => [0x44, 0x57, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00],
        }
    }

    fn from_magic(magic: &[u8]) -> Result<Self> {
        match magic {
            [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00] => Ok(SegmentFileType::Ewf),
            [0x4c, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00] => Ok(SegmentFileType::Lwf),
            [0x44, 0x57, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00] => Ok(SegmentFileType::Dwf),
            _ => Err(Error::CorruptSection("unrecognized segment file signature".into())),
        }
    }
}

/// Write the 13-byte file header and return the offset right after it.
pub fn write_file_header(
    pool: &mut FileIoPool,
    handle: PoolHandle,
    file_type: SegmentFileType,
    segment_number: u16,
) -> Result<u64> {
    let mut buf = [0u8; FILE_HEADER_SIZE as usize];
    buf[0..8].copy_from_slice(&file_type.magic());
    buf[8] = 1; // major version
    buf[9..11].copy_from_slice(&segment_number.to_le_bytes());
    // buf[11..13] left zero (reserved).
    pool.write_at(handle, 0, &buf)?;
    Ok(FILE_HEADER_SIZE)
}

pub struct ParsedFileHeader {
    pub file_type: SegmentFileType,
    pub segment_number: u16,
}

pub fn read_file_header(pool: &mut FileIoPool, handle: PoolHandle) -> Result<ParsedFileHeader> {
    let mut buf = [0u8; FILE_HEADER_SIZE as usize];
    pool.read_at(handle, 0, &mut buf)?;
    let file_type = SegmentFileType::from_magic(&buf[0..8])?;
    if buf[8] != 1 {
        return Err(Error::Unsupported(format!(
            "unsupported segment file major version {}",
            buf[8]
        )));
    }
    let segment_number = u16::from_le_bytes([buf[9], buf[10]]);
    Ok(ParsedFileHeader {
        file_type,
        segment_number,
    })
}

/// Everything recovered from walking one segment's section chain.
#[derive(Default)]
pub struct ParsedSegment {
    pub header_values: ValueTable,
    pub media_values: Option<MediaValues>,
    pub number_of_chunks_declared: u32,
    pub compression_level: u8,
    pub hash_md5: Option<[u8; 16]>,
    pub hash_sha1: Option<[u8; 20]>,
    pub xhash: ValueTable,
    pub acquisition_errors: SectorRangeTable,
    pub sessions: SectorRangeTable,
    pub section_list: SectionList,
    pub primary_chunks: OffsetTable,
    pub secondary_chunks: OffsetTable,
    /// `delta_chunk` overrides found in a DWF: `(chunk_number, raw bytes
    /// including trailing CRC)`.
    pub delta_chunks: Vec<(u64, Vec<u8>)>,
    pub ends_with_done: bool,
}

/// Walk the section chain of an already-open segment file, merging
/// discovered values into a [`ParsedSegment`]. `segment_index` is this
/// segment's position in the segment table's arena (for chunk
/// descriptors' non-owning back-reference); `starting_chunk` is the
/// global chunk number the first chunk in this segment's first `table`
/// corresponds to.
pub fn parse_segment(
    pool: &mut FileIoPool,
    handle: PoolHandle,
    segment_index: u32,
    starting_chunk: u64,
) -> Result<ParsedSegment> {
    let mut parsed = ParsedSegment::default();
    let mut current_offset = FILE_HEADER_SIZE;
    let mut chunk_cursor = starting_chunk;
    let mut sectors_section_end: Option<u64> = None;
    let mut table_group_first_chunk = starting_chunk;

    loop {
        let mut descriptor_buf = [0u8; SECTION_DESCRIPTOR_SIZE as usize];
        pool.read_at(handle, current_offset, &mut descriptor_buf)?;
        let descriptor = SectionDescriptor::parse(&descriptor_buf)?;
        let payload_offset = current_offset + SECTION_DESCRIPTOR_SIZE;
        let payload_len = descriptor
            .size
            .checked_sub(SECTION_DESCRIPTOR_SIZE)
            .ok_or_else(|| Error::CorruptSection("section smaller than its own descriptor".into()))?;

        let section_end = current_offset + descriptor.size;
        parsed
            .section_list
            .push(current_offset, section_end, descriptor.section_type.clone());

        match &descriptor.section_type {
            SectionType::Header => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let decompressed = crate::ewf::compress::inflate(&payload)?;
                // header is the weakest framing; never overwrite header2/xheader keys.
                let mut merged = values::parse_header(&decompressed);
                merged.extend(std::mem::take(&mut parsed.header_values));
                parsed.header_values = merged;
            }
            SectionType::Header2 => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let decompressed = crate::ewf::compress::inflate(&payload)?;
                let parsed_values = values::parse_header2(&decompressed)?;
                parsed.header_values.extend(parsed_values);
            }
            SectionType::XHeader => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let decompressed = crate::ewf::compress::inflate(&payload)?;
                let parsed_values = values::parse_xheader(&decompressed)?;
                parsed.header_values.extend(parsed_values);
            }
            SectionType::Volume | SectionType::Data => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let (media_values, number_of_chunks, compression_level) =
                    MediaValues::from_volume_payload(&payload)?;
                parsed.number_of_chunks_declared = number_of_chunks;
                parsed.compression_level = compression_level;
                parsed.media_values = Some(media_values);
            }
            SectionType::Sectors => {
                sectors_section_end = Some(section_end);
            }
            SectionType::Table | SectionType::Table2 => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let header = table_section::parse_header(&payload)?;
                let entries = table_section::parse_entries(&payload, header.count)?;
                // The last entry's size has no following offset to derive it
                // from, so it is sized against the `sectors` section this
                // table describes rather than the table's own end.
                let chunks_section_end = sectors_section_end.unwrap_or(current_offset);

                if descriptor.section_type == SectionType::Table {
                    table_group_first_chunk = chunk_cursor;
                    parsed.primary_chunks.fill_from_table_payload(
                        table_group_first_chunk,
                        entries,
                        header.count,
                        header.base_offset,
                        segment_index,
                        chunks_section_end,
                    )?;
                    chunk_cursor += header.count as u64;
                } else {
                    parsed.secondary_chunks.fill_from_table_payload(
                        table_group_first_chunk,
                        entries,
                        header.count,
                        header.base_offset,
                        segment_index,
                        chunks_section_end,
                    )?;
                }
            }
            SectionType::Hash => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                parsed.hash_md5 = Some(hash_section::parse_hash_section(&payload)?);
            }
            SectionType::Digest => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let (md5, sha1) = hash_section::parse_digest_section(&payload)?;
                parsed.hash_md5 = Some(md5);
                parsed.hash_sha1 = Some(sha1);
            }
            SectionType::XHash => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                let decompressed = crate::ewf::compress::inflate(&payload)?;
                parsed.xhash = hash_section::parse_xhash(&decompressed)?;
            }
            SectionType::Error2 => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                parse_sector_ranges(&payload, &mut parsed.acquisition_errors)?;
            }
            SectionType::Session => {
                let mut payload = vec![0u8; payload_len as usize];
                pool.read_at(handle, payload_offset, &mut payload)?;
                parse_sector_ranges(&payload, &mut parsed.sessions)?;
            }
            SectionType::DeltaChunk => {
                let mut chunk_number_buf = [0u8; 8];
                pool.read_at(handle, payload_offset, &mut chunk_number_buf)?;
                let chunk_number = u64::from_le_bytes(chunk_number_buf);

                let body_len = (payload_len as usize).saturating_sub(8);
                let mut body = vec![0u8; body_len];
                pool.read_at(handle, payload_offset + 8, &mut body)?;
                parsed.delta_chunks.push((chunk_number, body));
            }
            SectionType::Done => {
                parsed.ends_with_done = true;
            }
            SectionType::Next | SectionType::Other(_) => {}
        }

        if descriptor.section_type.is_terminator() || descriptor.next_offset == current_offset {
            break;
        }
        current_offset = descriptor.next_offset;
    }

    Ok(parsed)
}

fn parse_sector_ranges(payload: &[u8], table: &mut SectorRangeTable) -> Result<()> {
    // `count` u32-LE pairs of (first_sector, number_of_sectors), each u32,
    // followed by a trailing checksum — the same shape as a table section
    // but with 2-word entries instead of 1.
    if payload.len() < 8 {
        return Ok(());
    }
    let count = crate::ewf::codec::read_u32(payload, 0)?;
    for i in 0..count as usize {
        let base = 8 + i * 8;
        if base + 8 > payload.len() {
            break;
        }
        let first_sector = crate::ewf::codec::read_u32(payload, base)? as u64;
        let number_of_sectors = crate::ewf::codec::read_u32(payload, base + 4)? as u64;
        table.add(first_sector, number_of_sectors);
    }
    Ok(())
}

pub fn build_sector_range_section(table: &SectorRangeTable) -> Vec<u8> {
    let ranges = table.ranges();
    let mut buf = vec![0u8; 8 + ranges.len() * 8 + 4];
    crate::ewf::codec::write_u32(&mut buf, 0, ranges.len() as u32);
    for (i, range) in ranges.iter().enumerate() {
        let base = 8 + i * 8;
        crate::ewf::codec::write_u32(&mut buf, base, range.first_sector as u32);
        crate::ewf::codec::write_u32(&mut buf, base + 4, range.number_of_sectors as u32);
    }
    let checksum_offset = buf.len() - 4;
    let checksum = adler32(&buf[0..checksum_offset]);
    crate::ewf::codec::write_u32(&mut buf, checksum_offset, checksum);
    buf
}

/// Write a section descriptor + payload at `offset`, returning the offset
/// right after it. `next_offset` should be patched afterwards by the
/// caller once the following section's start is known (writer callers
/// always know it immediately since sections are written back-to-back).
pub fn write_section(
    pool: &mut FileIoPool,
    handle: PoolHandle,
    offset: u64,
    section_type: SectionType,
    payload: &[u8],
    next_offset: u64,
) -> Result<u64> {
    let size = SECTION_DESCRIPTOR_SIZE + payload.len() as u64;
    let descriptor = SectionDescriptor {
        section_type,
        next_offset,
        size,
    };
    pool.write_at(handle, offset, &descriptor.to_bytes())?;
    pool.write_at(handle, offset + SECTION_DESCRIPTOR_SIZE, payload)?;
    Ok(offset + size)
}

/// Re-patch just the `next_offset` field of an already-written descriptor
/// (used once a chunks section's real end is known).
pub fn patch_next_offset(
    pool: &mut FileIoPool,
    handle: PoolHandle,
    descriptor_offset: u64,
    next_offset: u64,
) -> Result<()> {
    // next_offset lives at byte 16 of the descriptor; re-deriving the
    // whole descriptor means re-reading its type/size first so the
    // checksum stays correct.
    let mut buf = [0u8; SECTION_DESCRIPTOR_SIZE as usize];
    pool.read_at(handle, descriptor_offset, &mut buf)?;
    let mut descriptor = SectionDescriptor::parse(&buf)?;
    descriptor.next_offset = next_offset;
    pool.write_at(handle, descriptor_offset, &descriptor.to_bytes())?;
    Ok(())
}

/// Re-patch the `size` field (used once a chunks/table section's real
/// length is known, alongside [`patch_next_offset`]).
pub fn patch_size(
    pool: &mut FileIoPool,
    handle: PoolHandle,
    descriptor_offset: u64,
    size: u64,
) -> Result<()> {
    let mut buf = [0u8; SECTION_DESCRIPTOR_SIZE as usize];
    pool.read_at(handle, descriptor_offset, &mut buf)?;
    let mut descriptor = SectionDescriptor::parse(&buf)?;
    descriptor.size = size;
    pool.write_at(handle, descriptor_offset, &descriptor.to_bytes())?;
    Ok(())
}

pub fn compression_level_to_wire(level: CompressionLevel) -> u8 {
    match level {
        CompressionLevel::None => 0,
        CompressionLevel::Fast => 1,
        CompressionLevel::Best => 2,
    }
}

pub fn compression_level_from_wire(level: u8) -> Result<CompressionLevel> {
    match level {
        0 => Ok(CompressionLevel::None),
        1 => Ok(CompressionLevel::Fast),
        2 => Ok(CompressionLevel::Best),
        other => Err(Error::Unsupported(format!(
            "unknown compression level byte {other}"
        ))),
    }
}
