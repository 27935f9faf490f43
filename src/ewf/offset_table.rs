//! The chunk/offset table (spec §3, §4.5): maps a global chunk index to
//! `(segment, file offset, size, flags)`. Chunk descriptors are owned here
//! in a flat, geometrically-grown array and only *reference* a segment by
//! index into the segment table's arena — no owning pointer, so there is
//! nothing to keep alive beyond the segment table itself (spec §9 "pointer
//! graphs").

use crate::ewf::codec::read_u32;
use crate::ewf::error::{Error, Result};
use crate::ewf::section::SectionList;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChunkFlags: u8 {
        const COMPRESSED = 0x01;
        const TAINTED = 0x02;
        const CORRUPTED = 0x04;
        const MISSING = 0x08;
        const DELTA = 0x80;
    }
}

/// A single chunk's location and metadata. `size` includes the trailing
/// CRC for uncompressed chunks (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct ChunkDescriptor {
    pub segment_index: u32,
    pub file_offset: u64,
    pub size: u32,
    pub flags: ChunkFlags,
}

impl ChunkDescriptor {
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(ChunkFlags::COMPRESSED)
    }

    pub fn is_delta(&self) -> bool {
        self.flags.contains(ChunkFlags::DELTA)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    entries: Vec<Option<ChunkDescriptor>>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert (or overwrite, for delta rewrites) the descriptor for
    /// `chunk_idx`, growing the backing array geometrically as needed.
    pub fn insert(&mut self, chunk_idx: u64, descriptor: ChunkDescriptor) {
        let idx = chunk_idx as usize;
        if idx >= self.entries.len() {
            let new_len = (self.entries.len().max(16) * 2).max(idx + 1);
            self.entries.resize(new_len, None);
        }
        self.entries[idx] = Some(descriptor);
    }

    /// Iterate over every populated `(chunk_idx, descriptor)` pair in
    /// order — used when merging a segment's table into the acquisition-
    /// wide one, where indices must be preserved rather than renumbered.
    pub fn iter(&self) -> impl Iterator<Item = (u64, ChunkDescriptor)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|d| (i as u64, d)))
    }

    pub fn lookup(&self, chunk_idx: u64) -> Result<ChunkDescriptor> {
        self.entries
            .get(chunk_idx as usize)
            .and_then(|e| *e)
            .ok_or_else(|| Error::ValueOutOfBounds(format!("no such chunk: {chunk_idx}")))
    }

    /// Prefetch hint: returns the descriptor so the read path can position
    /// its segment-file cursor ahead of the actual read. The pool does the
    /// real seeking; this just resolves which segment/offset to seek to.
    pub fn seek_chunk(&self, chunk_idx: u64) -> Result<ChunkDescriptor> {
        self.lookup(chunk_idx)
    }

    pub fn mark_flags(&mut self, chunk_idx: u64, flags: ChunkFlags) -> Result<()> {
        let idx = chunk_idx as usize;
        let entry = self
            .entries
            .get_mut(idx)
            .and_then(|e| e.as_mut())
            .ok_or_else(|| Error::ValueOutOfBounds(format!("no such chunk: {chunk_idx}")))?;
        entry.flags |= flags;
        Ok(())
    }

    /// Populate descriptors for chunks `[first_chunk, first_chunk + count)`
    /// from a raw `table`/`table2` entry blob (spec §4.3): `count` u32
    /// little-endian entries, each the chunk's offset relative to
    /// `base_offset` with the high bit marking "compressed". The final
    /// entry's size is derived from `chunks_section_end`.
    pub fn fill_from_table_payload(
        &mut self,
        first_chunk: u64,
        raw_entries: &[u8],
        count: u32,
        base_offset: u64,
        segment_index: u32,
        chunks_section_end: u64,
    ) -> Result<()> {
        const COMPRESSED_BIT: u32 = 0x8000_0000;

        let mut offsets = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let raw = read_u32(raw_entries, i * 4)?;
            let compressed = (raw & COMPRESSED_BIT) != 0;
            let offset = base_offset + (raw & 0x7FFF_FFFF) as u64;
            offsets.push((offset, compressed));
        }

        for i in 0..count as usize {
            let (offset, compressed) = offsets[i];
            let end = if i + 1 < offsets.len() {
                offsets[i + 1].0
            } else {
                chunks_section_end
            };
            if end < offset {
                return Err(Error::CorruptSection(
                    "table entry offsets are not increasing".into(),
                ));
            }
            let mut flags = ChunkFlags::empty();
            if compressed {
                flags |= ChunkFlags::COMPRESSED;
            }
            self.insert(
                first_chunk + i as u64,
                ChunkDescriptor {
                    segment_index,
                    file_offset: offset,
                    size: (end - offset) as u32,
                    flags,
                },
            );
        }
        Ok(())
    }

    /// Compare this (primary) table against a secondary `table2`-derived
    /// table over `[0, len)`. Returns the index of the first chunk where
    /// they diverge, if any.
    pub fn compare(&self, secondary: &OffsetTable) -> Option<u64> {
        let len = self.entries.len().max(secondary.entries.len());
        for i in 0..len {
            let a = self.entries.get(i).and_then(|e| *e);
            let b = secondary.entries.get(i).and_then(|e| *e);
            match (a, b) {
                (None, None) => continue,
                (Some(a), Some(b)) => {
                    if a.file_offset != b.file_offset || a.size != b.size {
                        return Some(i as u64);
                    }
                }
                _ => return Some(i as u64),
            }
        }
        None
    }

    /// Derive the end-of-chunks-section offset used to size the final
    /// chunk entry, from a segment's parsed section list (spec §4.5).
    pub fn calculate_last_offset(section_list: &SectionList) -> Option<u64> {
        section_list.last_sectors_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ewf::codec::write_u32;

    fn entry_bytes(entries: &[(u32, bool)]) -> Vec<u8> {
        let mut buf = vec![0u8; entries.len() * 4];
        for (i, (offset, compressed)) in entries.iter().enumerate() {
            let mut raw = *offset;
            if *compressed {
                raw |= 0x8000_0000;
            }
            write_u32(&mut buf, i * 4, raw);
        }
        buf
    }

    #[test]
    fn fills_and_sizes_entries_from_payload() {
        let mut table = OffsetTable::new();
        let raw = entry_bytes(&[(0, false), (100, true)]);
        table
            .fill_from_table_payload(0, &raw, 2, 1000, 1, 1300)
            .unwrap();
        let first = table.lookup(0).unwrap();
        assert_eq!(first.file_offset, 1000);
        assert_eq!(first.size, 100);
        assert!(!first.is_compressed());

        let second = table.lookup(1).unwrap();
        assert_eq!(second.file_offset, 1100);
        assert_eq!(second.size, 200);
        assert!(second.is_compressed());
    }

    #[test]
    fn compare_detects_divergence() {
        let mut primary = OffsetTable::new();
        let mut secondary = OffsetTable::new();
        let raw = entry_bytes(&[(0, false), (100, false)]);
        primary.fill_from_table_payload(0, &raw, 2, 1000, 1, 1200).unwrap();
        secondary.fill_from_table_payload(0, &raw, 2, 1000, 1, 1200).unwrap();
        assert_eq!(primary.compare(&secondary), None);

        secondary.mark_flags(1, ChunkFlags::TAINTED).unwrap();
        // flags aren't compared (only offset/size), so this must still match.
        assert_eq!(primary.compare(&secondary), None);

        let mut other = OffsetTable::new();
        let raw2 = entry_bytes(&[(0, false), (999, false)]);
        other.fill_from_table_payload(0, &raw2, 2, 1000, 1, 1999).unwrap();
        assert_eq!(primary.compare(&other), Some(1));
    }
}
