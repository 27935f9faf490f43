//! Section framing (spec §4.1, §6.1): the 76-byte descriptor that precedes
//! every section, and the per-segment linked list those descriptors form
//! via `next_offset`.

use crate::ewf::codec::{adler32, read_u64, write_u64};
use crate::ewf::error::{Error, Result};

pub const SECTION_DESCRIPTOR_SIZE: u64 = 76;
const TYPE_FIELD_LEN: usize = 16;
const RESERVED_LEN: usize = 40;

/// Well-known section type tags. Unknown types are preserved as
/// [`SectionType::Other`] so the reader never rejects a section it simply
/// doesn't interpret yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionType {
    Header,
    Header2,
    XHeader,
    Volume,
    Data,
    Sectors,
    Table,
    Table2,
    Hash,
    Digest,
    XHash,
    Error2,
    Session,
    DeltaChunk,
    Next,
    Done,
    Other(String),
}

impl SectionType {
    pub fn as_str(&self) -> &str {
        match self {
            SectionType::Header => "header",
            SectionType::Header2 => "header2",
            SectionType::XHeader => "xheader",
            SectionType::Volume => "volume",
            SectionType::Data => "data",
            SectionType::Sectors => "sectors",
            SectionType::Table => "table",
            SectionType::Table2 => "table2",
            SectionType::Hash => "hash",
            SectionType::Digest => "digest",
            SectionType::XHash => "xhash",
            SectionType::Error2 => "error2",
            SectionType::Session => "session",
            SectionType::DeltaChunk => "delta_chunk",
            SectionType::Next => "next",
            SectionType::Done => "done",
            SectionType::Other(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> SectionType {
        match s {
            "header" => SectionType::Header,
            "header2" => SectionType::Header2,
            "xheader" => SectionType::XHeader,
            "volume" | "disk" => SectionType::Volume,
            "data" => SectionType::Data,
            "sectors" => SectionType::Sectors,
            "table" => SectionType::Table,
            "table2" => SectionType::Table2,
            "hash" => SectionType::Hash,
            "digest" => SectionType::Digest,
            "xhash" => SectionType::XHash,
            "error2" => SectionType::Error2,
            "session" => SectionType::Session,
            "delta_chunk" => SectionType::DeltaChunk,
            "next" => SectionType::Next,
            "done" => SectionType::Done,
            other => SectionType::Other(other.to_string()),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, SectionType::Next | SectionType::Done)
    }
}

/// The 76-byte on-disk section descriptor (spec §6.1).
#[derive(Debug, Clone)]
pub struct SectionDescriptor {
    pub section_type: SectionType,
    /// Absolute file offset of the next section descriptor (self-offset
    /// on a terminator).
    pub next_offset: u64,
    /// Total section bytes including this 76-byte descriptor.
    pub size: u64,
}

impl SectionDescriptor {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SECTION_DESCRIPTOR_SIZE as usize {
            return Err(Error::CorruptSection("section descriptor truncated".into()));
        }
        let mut type_bytes = [0u8; TYPE_FIELD_LEN];
        type_bytes.copy_from_slice(&buf[0..TYPE_FIELD_LEN]);
        let nul = type_bytes.iter().position(|&b| b == 0).unwrap_or(TYPE_FIELD_LEN);
        let type_str = std::str::from_utf8(&type_bytes[..nul])
            .map_err(|_| Error::CorruptSection("section type is not valid ASCII".into()))?;

        let next_offset = read_u64(buf, TYPE_FIELD_LEN)?;
        let size = read_u64(buf, TYPE_FIELD_LEN + 8)?;
        let stored_checksum = crate::ewf::codec::read_u32(buf, TYPE_FIELD_LEN + 16 + RESERVED_LEN)?;

        let computed = adler32(&buf[0..TYPE_FIELD_LEN + 16 + RESERVED_LEN]);
        if computed != stored_checksum {
            return Err(Error::ChecksumMismatch {
                context: format!("section descriptor ({type_str})"),
                expected: stored_checksum,
                computed,
            });
        }

        Ok(Self {
            section_type: SectionType::from_str(type_str),
            next_offset,
            size,
        })
    }

    /// Serialize the descriptor (with a correct trailing Adler-32) ready
    /// to be written at the section's start offset.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SECTION_DESCRIPTOR_SIZE as usize];
        let type_str = self.section_type.as_str().as_bytes();
        let n = type_str.len().min(TYPE_FIELD_LEN);
        buf[0..n].copy_from_slice(&type_str[..n]);
        write_u64(&mut buf, TYPE_FIELD_LEN, self.next_offset);
        write_u64(&mut buf, TYPE_FIELD_LEN + 8, self.size);
        // bytes [24..64) are the 40 reserved bytes, already zeroed.
        let checksum = adler32(&buf[0..TYPE_FIELD_LEN + 16 + RESERVED_LEN]);
        crate::ewf::codec::write_u32(&mut buf, TYPE_FIELD_LEN + 16 + RESERVED_LEN, checksum);
        buf
    }
}

/// One entry in a segment's in-order section list (spec §3, §8 invariant 3).
#[derive(Debug, Clone)]
pub struct SectionListEntry {
    pub start_offset: u64,
    pub end_offset: u64,
    pub section_type: SectionType,
}

#[derive(Debug, Clone, Default)]
pub struct SectionList {
    entries: Vec<SectionListEntry>,
}

impl SectionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, start_offset: u64, end_offset: u64, section_type: SectionType) {
        self.entries.push(SectionListEntry {
            start_offset,
            end_offset,
            section_type,
        });
    }

    pub fn entries(&self) -> &[SectionListEntry] {
        &self.entries
    }

    /// End offset of the most recently opened `sectors` section — used to
    /// size the final chunk of a chunks section (spec §4.5
    /// `calculate_last_offset`).
    pub fn last_sectors_end(&self) -> Option<u64> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.section_type == SectionType::Sectors)
            .map(|e| e.end_offset)
    }

    /// Validates spec §8 invariant 3: non-overlapping, strictly increasing
    /// start offsets with no gaps, covering `[0, segment_end)`.
    pub fn validate_contiguous(&self, segment_end: u64) -> Result<()> {
        let mut expected = self.entries.first().map(|e| e.start_offset).unwrap_or(0);
        for entry in &self.entries {
            if entry.start_offset != expected {
                return Err(Error::CorruptSection(format!(
                    "section list gap: expected {expected}, found {}",
                    entry.start_offset
                )));
            }
            if entry.end_offset < entry.start_offset {
                return Err(Error::CorruptSection("section has negative length".into()));
            }
            expected = entry.end_offset;
        }
        if let Some(last) = self.entries.last() {
            if last.end_offset != segment_end && !last.section_type.is_terminator() {
                return Err(Error::CorruptSection(
                    "section list does not cover the whole segment".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_descriptor() {
        let descriptor = SectionDescriptor {
            section_type: SectionType::Table,
            next_offset: 4096,
            size: 512,
        };
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes.len(), SECTION_DESCRIPTOR_SIZE as usize);
        let parsed = SectionDescriptor::parse(&bytes).unwrap();
        assert_eq!(parsed.section_type, SectionType::Table);
        assert_eq!(parsed.next_offset, 4096);
        assert_eq!(parsed.size, 512);
    }

    #[test]
    fn detects_checksum_corruption() {
        let descriptor = SectionDescriptor {
            section_type: SectionType::Done,
            next_offset: 0,
            size: 76,
        };
        let mut bytes = descriptor.to_bytes();
        bytes[0] = b'x'; // corrupt the type tag after the checksum was computed
        assert!(SectionDescriptor::parse(&bytes).is_err());
    }

    #[test]
    fn section_list_detects_gap() {
        let mut list = SectionList::new();
        list.push(0, 100, SectionType::Header);
        list.push(200, 300, SectionType::Volume);
        assert!(list.validate_contiguous(300).is_err());
    }
}
