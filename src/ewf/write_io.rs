//! The write-side rollover planner (spec §4.6): decides when the current
//! chunks section must close and a `table`/`table2` pair be emitted, and
//! when the current segment file itself must close and a new one be
//! started. Pure bookkeeping — it never touches a [`FileIoPool`] itself;
//! [`crate::ewf::handle::EwfHandle`] calls it before every chunk write and
//! acts on its verdict.

use crate::ewf::error::{Error, Result};
use crate::ewf::format::Format;
use crate::ewf::segment_file::FILE_HEADER_SIZE;

/// Default target segment size (1.4 GiB), matching the conservative
/// default EnCase-family acquisition tools use so images stay portable
/// across FAT32-formatted evidence drives even though the format itself
/// allows much larger segments.
pub const DEFAULT_SEGMENT_FILE_SIZE: u64 = 1_400 * 1024 * 1024;

/// Tracks how much of the current segment/section has been filled so the
/// handle knows when to roll over.
pub struct WriteIoHandle {
    format: Format,
    chunk_size: u32,
    max_offsets_in_table: u32,
    segment_file_size_target: u64,

    current_segment_size: u64,
    current_chunks_in_section: u32,
    total_chunks_written: u64,
}

impl WriteIoHandle {
    pub fn new(format: Format, chunk_size: u32) -> Self {
        Self::with_segment_size_target(format, chunk_size, DEFAULT_SEGMENT_FILE_SIZE)
    }

    pub fn with_segment_size_target(format: Format, chunk_size: u32, segment_file_size_target: u64) -> Self {
        Self {
            format,
            chunk_size,
            max_offsets_in_table: format.max_offsets_in_table(),
            segment_file_size_target: segment_file_size_target.min(format.maximum_segment_file_size()),
            current_segment_size: FILE_HEADER_SIZE,
            current_chunks_in_section: 0,
            total_chunks_written: 0,
        }
    }

    pub fn total_chunks_written(&self) -> u64 {
        self.total_chunks_written
    }

    pub fn current_chunks_in_section(&self) -> u32 {
        self.current_chunks_in_section
    }

    /// Worst-case bytes a single chunk can add to a segment: its declared
    /// size plus a table entry (4 bytes) it earns in the eventual `table`/
    /// `table2` pair, doubled for a non-`SmartS01` format that always
    /// writes both.
    fn worst_case_chunk_overhead(&self, chunk_payload_len: usize) -> u64 {
        let table_entry_cost = if self.format.writes_table2() { 8 } else { 4 };
        chunk_payload_len as u64 + table_entry_cost
    }

    /// `true` if the current chunks section has reached this format's
    /// `max_offsets_in_table` cap and must be closed before another chunk
    /// is appended (spec §4.6).
    pub fn chunks_section_full(&self) -> bool {
        self.current_chunks_in_section >= self.max_offsets_in_table
    }

    /// `true` if appending a chunk of `chunk_payload_len` bytes (already
    /// compressed, if applicable, with its trailing CRC) would push the
    /// current segment past its size target.
    pub fn segment_full(&self, chunk_payload_len: usize) -> bool {
        let projected = self.current_segment_size + self.worst_case_chunk_overhead(chunk_payload_len);
        projected > self.segment_file_size_target
    }

    /// Record that a chunk of `chunk_payload_len` bytes (as stored,
    /// post-compression) was just appended to the current chunks section.
    pub fn record_chunk_written(&mut self, chunk_payload_len: usize) {
        self.current_segment_size += chunk_payload_len as u64;
        self.current_chunks_in_section += 1;
        self.total_chunks_written += 1;
    }

    /// Account for the fixed overhead of a section descriptor plus its
    /// payload once written (header/volume/table/hash/etc sections, not
    /// chunk payloads — those go through [`record_chunk_written`]).
    pub fn record_section_written(&mut self, section_total_len: u64) {
        self.current_segment_size += section_total_len;
    }

    /// Reset chunks-section bookkeeping once a `table`/`table2` pair has
    /// been emitted and a fresh `sectors` section is about to open.
    pub fn begin_new_chunks_section(&mut self) {
        self.current_chunks_in_section = 0;
    }

    /// Reset segment bookkeeping once a new segment file's header has
    /// been written.
    pub fn begin_new_segment(&mut self) {
        self.current_segment_size = FILE_HEADER_SIZE;
        self.current_chunks_in_section = 0;
    }

    /// How many whole chunks still fit in the current chunks section
    /// under the offset-table cap — useful for the handle to batch reads
    /// of contiguous chunks without re-checking after every single one.
    pub fn chunks_remaining_in_section(&self) -> u32 {
        self.max_offsets_in_table
            .saturating_sub(self.current_chunks_in_section)
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Re-derive the chunk size after a geometry setter changes
    /// `sectors_per_chunk`/`bytes_per_sector` post-`create` but pre-first-chunk.
    pub fn set_chunk_size(&mut self, chunk_size: u32) {
        self.chunk_size = chunk_size;
    }

    /// Change the segment-size target. Validates `bytes` itself against
    /// the format's ceiling — the original implementation this is
    /// modeled on mistakenly re-checked the handle's *current* target
    /// instead of the incoming argument here, which let a caller set an
    /// out-of-range value the first time (spec §9 "probable source bug").
    pub fn set_segment_file_size_target(&mut self, bytes: u64) -> Result<()> {
        if bytes > self.format.maximum_segment_file_size() {
            return Err(Error::ValueOutOfBounds(format!(
                "segment file size {bytes} exceeds this format's maximum of {}",
                self.format.maximum_segment_file_size()
            )));
        }
        if bytes == 0 {
            return Err(Error::InvalidArgument("segment file size must be non-zero".into()));
        }
        self.segment_file_size_target = bytes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_section_closes_at_format_cap() {
        let mut planner = WriteIoHandle::new(Format::EnCase1, 32_768);
        assert_eq!(planner.max_offsets_in_table, 16_375);
        for _ in 0..16_375 {
            planner.record_chunk_written(100);
        }
        assert!(planner.chunks_section_full());
    }

    #[test]
    fn segment_rolls_over_before_exceeding_target() {
        let mut planner = WriteIoHandle::with_segment_size_target(Format::Ewf, 32_768, 1_000);
        assert!(!planner.segment_full(500));
        planner.record_chunk_written(500);
        assert!(planner.segment_full(600));
    }

    #[test]
    fn new_segment_resets_bookkeeping() {
        let mut planner = WriteIoHandle::new(Format::Ewf, 32_768);
        planner.record_chunk_written(100);
        planner.begin_new_segment();
        assert_eq!(planner.current_chunks_in_section(), 0);
    }

    #[test]
    fn segment_file_size_target_rejects_values_past_format_ceiling() {
        let mut planner = WriteIoHandle::new(Format::Ewf, 32_768);
        let ceiling = Format::Ewf.maximum_segment_file_size();
        assert!(planner.set_segment_file_size_target(ceiling + 1).is_err());
        assert!(planner.set_segment_file_size_target(1_000_000).is_ok());
        assert!(planner.segment_full(999_999));
    }
}
