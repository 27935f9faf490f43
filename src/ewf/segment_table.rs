//! The ordered arena of segment files that make up one acquisition (spec
//! §3, §4.6): owns each segment's path and pool handle, and knows how to
//! mint the next filename in EnCase's extension cycle
//! (`.E01`…`.E99`,`.EAA`…`.EZZ`…) when a write rolls over.
//!
//! [`DeltaSegmentTable`] is the same arena shape for DWF delta files, kept
//! separate because delta segments are addressed by chunk number, not by
//! position in the acquisition sequence (spec §4.7).

use std::path::{Path, PathBuf};

use crate::ewf::error::{Error, Result};
use crate::ewf::format::Format;
use crate::ewf::io_pool::{FileIoPool, PoolHandle};

/// One segment file's identity within the table: its number (1-based, per
/// spec §3), on-disk path, and pool handle.
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    pub segment_number: u32,
    pub path: PathBuf,
    pub pool_handle: PoolHandle,
}

#[derive(Default)]
pub struct SegmentTable {
    entries: Vec<SegmentEntry>,
    basename: PathBuf,
    format: Option<Format>,
}

impl SegmentTable {
    pub fn new(basename: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            basename: basename.into(),
            format: None,
        }
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = Some(format);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index into the backing arena for `segment_number` (the `segment_index`
    /// a [`crate::ewf::offset_table::ChunkDescriptor`] refers back to).
    pub fn index_of(&self, segment_number: u32) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| e.segment_number == segment_number)
            .map(|i| i as u32)
    }

    pub fn get(&self, index: u32) -> Result<&SegmentEntry> {
        self.entries
            .get(index as usize)
            .ok_or_else(|| Error::ValueOutOfBounds(format!("no such segment index: {index}")))
    }

    pub fn entries(&self) -> &[SegmentEntry] {
        &self.entries
    }

    /// Register (without opening) the already-known path for
    /// `segment_number`, used while reading an existing image whose
    /// filenames were discovered by the caller.
    pub fn register_existing(
        &mut self,
        pool: &mut FileIoPool,
        segment_number: u32,
        path: impl Into<PathBuf>,
    ) -> u32 {
        let path = path.into();
        let handle = pool.register(&path, false);
        self.entries.push(SegmentEntry {
            segment_number,
            path,
            pool_handle: handle,
        });
        (self.entries.len() - 1) as u32
    }

    /// Mint and register the next segment file for a write in progress.
    /// Fails once `Format::maximum_segment_number` is exceeded (spec §4.6).
    pub fn create_next(&mut self, pool: &mut FileIoPool) -> Result<u32> {
        let next_number = self.entries.len() as u32 + 1;
        let format = self
            .format
            .ok_or_else(|| Error::StateViolation("segment table has no format set".into()))?;
        if next_number > format.maximum_segment_number() {
            return Err(Error::ValueOutOfBounds(format!(
                "segment number {next_number} exceeds this format's maximum of {}",
                format.maximum_segment_number()
            )));
        }
        let extension = extension_for(next_number, format)?;
        let path = self.basename.with_extension(extension);
        let handle = pool.register(&path, true);
        self.entries.push(SegmentEntry {
            segment_number: next_number,
            path,
            pool_handle: handle,
        });
        Ok((self.entries.len() - 1) as u32)
    }
}

/// A DWF-keyed arena: one delta segment file per chunk-rewrite session,
/// addressed by chunk number rather than acquisition sequence (spec §4.7).
#[derive(Default)]
pub struct DeltaSegmentTable {
    entries: Vec<SegmentEntry>,
    basename: PathBuf,
}

impl DeltaSegmentTable {
    pub fn new(basename: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            basename: basename.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Result<&SegmentEntry> {
        self.entries
            .get(index as usize)
            .ok_or_else(|| Error::ValueOutOfBounds(format!("no such delta segment index: {index}")))
    }

    pub fn current(&self) -> Option<&SegmentEntry> {
        self.entries.last()
    }

    /// Open (creating if absent) the single active delta segment, or start
    /// a new one once the active one has grown past a size the caller
    /// decides is too large (spec §4.7 "new DWF on overflow").
    pub fn ensure_active(&mut self, pool: &mut FileIoPool) -> u32 {
        if !self.entries.is_empty() {
            return (self.entries.len() - 1) as u32;
        }
        self.start_new(pool)
    }

    pub fn start_new(&mut self, pool: &mut FileIoPool) -> u32 {
        let segment_number = self.entries.len() as u32 + 1;
        let extension = format!("d{:02}", segment_number.min(99));
        let path = self.basename.with_extension(extension);
        let handle = pool.register(&path, true);
        self.entries.push(SegmentEntry {
            segment_number,
            path,
            pool_handle: handle,
        });
        (self.entries.len() - 1) as u32
    }
}

/// EnCase's extension cycle (spec §4.6): `E01`..`E99`, then `EAA`..`EZZ`,
/// then `FAA`..`FZZ`, … . `SmartS01` uses the lowercase `s`-rooted cycle
/// instead of `E`.
pub fn extension_for(segment_number: u32, format: Format) -> Result<String> {
    if segment_number == 0 {
        return Err(Error::InvalidArgument("segment numbers are 1-based".into()));
    }
    if segment_number <= 99 {
        let prefix = first_letter(format);
        return Ok(format!("{prefix}{segment_number:02}"));
    }

    let remainder = segment_number - 100;
    let letters_per_first = 26 * 26;
    if remainder as u64 >= letters_per_first as u64 * 25 {
        return Err(Error::ValueOutOfBounds(format!(
            "segment number {segment_number} exceeds the extension cycle"
        )));
    }
    let first_index = remainder / letters_per_first;
    let rest = remainder % letters_per_first;
    let second = (rest / 26) as u8;
    let third = (rest % 26) as u8;

    let first_base = match format {
        Format::SmartS01 => b't',
        _ => b'E',
    };
    let first = first_base + first_index as u8;
    let second_letter = (b'A' + second) as char;
    let third_letter = (b'A' + third) as char;
    Ok(format!("{}{}{}", first as char, second_letter, third_letter))
}

fn first_letter(format: Format) -> char {
    match format {
        Format::SmartS01 => 's',
        _ => 'E',
    }
}

/// Derive `(directory, stem)` so [`SegmentTable::new`]/[`DeltaSegmentTable::new`]
/// can build sibling filenames with `PathBuf::with_extension`.
pub fn basename_of(first_segment_path: &Path) -> PathBuf {
    first_segment_path.with_extension("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extension_cycles_through_two_letter_range() {
        assert_eq!(extension_for(1, Format::Ewf).unwrap(), "E01");
        assert_eq!(extension_for(99, Format::Ewf).unwrap(), "E99");
        assert_eq!(extension_for(100, Format::Ewf).unwrap(), "EAA");
        assert_eq!(extension_for(101, Format::Ewf).unwrap(), "EAB");
        assert_eq!(extension_for(125, Format::Ewf).unwrap(), "EAZ");
        assert_eq!(extension_for(126, Format::Ewf).unwrap(), "EBA");
    }

    #[test]
    fn smart_format_uses_lowercase_s_root() {
        assert_eq!(extension_for(1, Format::SmartS01).unwrap(), "s01");
    }

    #[test]
    fn create_next_mints_sequential_segments() {
        let dir = tempdir().unwrap();
        let mut pool = FileIoPool::new(8);
        let mut table = SegmentTable::new(dir.path().join("image"));
        table.set_format(Format::Ewf);
        let first = table.create_next(&mut pool).unwrap();
        let second = table.create_next(&mut pool).unwrap();
        assert_eq!(table.get(first).unwrap().segment_number, 1);
        assert_eq!(table.get(second).unwrap().segment_number, 2);
        assert!(table.get(first).unwrap().path.to_string_lossy().ends_with("E01"));
        assert!(table.get(second).unwrap().path.to_string_lossy().ends_with("E02"));
    }
}
