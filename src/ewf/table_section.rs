//! Wire layout for `table`/`table2` section payloads (spec §4.3, §6.1):
//! a 36-byte header (entry count, base offset, checksum of the header
//! itself) followed by `count` little-endian u32 entries and a trailing
//! checksum of the entries. The in-memory side of this lives in
//! [`crate::ewf::offset_table`]; this module only knows the bytes.

use crate::ewf::codec::{adler32, read_u32, read_u64, write_u32, write_u64};
use crate::ewf::error::{Error, Result};

pub const TABLE_HEADER_SIZE: usize = 36;

pub struct TableHeader {
    pub count: u32,
    pub base_offset: u64,
}

/// Parse the 36-byte header at the start of a `table`/`table2` payload.
pub fn parse_header(buf: &[u8]) -> Result<TableHeader> {
    if buf.len() < TABLE_HEADER_SIZE {
        return Err(Error::CorruptSection("table header truncated".into()));
    }
    let count = read_u32(buf, 0)?;
    let base_offset = read_u64(buf, 8)?;
    let stored_checksum = read_u32(buf, 32)?;
    let computed = adler32(&buf[0..32]);
    if stored_checksum != computed {
        return Err(Error::ChecksumMismatch {
            context: "table section header".into(),
            expected: stored_checksum,
            computed,
        });
    }
    Ok(TableHeader { count, base_offset })
}

/// Validate the trailing checksum over the `count * 4` entry bytes and
/// return them as a slice ready for
/// [`crate::ewf::offset_table::OffsetTable::fill_from_table_payload`].
pub fn parse_entries<'a>(buf: &'a [u8], count: u32) -> Result<&'a [u8]> {
    let entries_len = count as usize * 4;
    let entries_end = TABLE_HEADER_SIZE + entries_len;
    if buf.len() < entries_end + 4 {
        return Err(Error::CorruptSection("table entries truncated".into()));
    }
    let entries = &buf[TABLE_HEADER_SIZE..entries_end];
    let stored_checksum = read_u32(buf, entries_end)?;
    let computed = adler32(entries);
    if stored_checksum != computed {
        return Err(Error::ChecksumMismatch {
            context: "table section entries".into(),
            expected: stored_checksum,
            computed,
        });
    }
    Ok(entries)
}

/// Build a complete `table`/`table2` payload from `entries` (already
/// high-bit-tagged for compression, offsets relative to `base_offset`).
pub fn build(base_offset: u64, entries: &[u32]) -> Vec<u8> {
    let mut buf = vec![0u8; TABLE_HEADER_SIZE + entries.len() * 4 + 4];
    write_u32(&mut buf, 0, entries.len() as u32);
    write_u64(&mut buf, 8, base_offset);
    let header_checksum = adler32(&buf[0..32]);
    write_u32(&mut buf, 32, header_checksum);

    for (i, &entry) in entries.iter().enumerate() {
        write_u32(&mut buf, TABLE_HEADER_SIZE + i * 4, entry);
    }
    let entries_end = TABLE_HEADER_SIZE + entries.len() * 4;
    let entries_checksum = adler32(&buf[TABLE_HEADER_SIZE..entries_end]);
    write_u32(&mut buf, entries_end, entries_checksum);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let entries = vec![0u32, 100, 0x8000_0032];
        let payload = build(5000, &entries);
        let header = parse_header(&payload).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.base_offset, 5000);
        let raw_entries = parse_entries(&payload, header.count).unwrap();
        assert_eq!(read_u32(raw_entries, 8).unwrap(), 0x8000_0032);
    }

    #[test]
    fn detects_corrupted_entries() {
        let entries = vec![0u32, 100];
        let mut payload = build(0, &entries);
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let header = parse_header(&payload).unwrap();
        assert!(parse_entries(&payload, header.count).is_err());
    }
}
