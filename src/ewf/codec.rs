//! Fixed little-endian integer pack/unpack helpers and the Adler-32 running
//! checksum used for both section descriptors and uncompressed chunk CRCs.
//!
//! Every multi-byte field on the wire is little-endian, so this module is
//! deliberately tiny: it exists to keep the `from_le_bytes`/`to_le_bytes`
//! incantations and their bounds checks in one place instead of scattered
//! across every section parser.

use crate::ewf::error::{Error, Result};

/// Read a little-endian `u16` out of `buf` at `offset`.
pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let bytes = slice(buf, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian `u32` out of `buf` at `offset`.
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = slice(buf, offset, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Read a little-endian `u64` out of `buf` at `offset`.
pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let bytes = slice(buf, offset, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buf.get(offset..offset + len)
        .ok_or_else(|| Error::CorruptSection(format!(
            "buffer too short: need {} bytes at offset {}, have {}",
            len, offset, buf.len()
        )))
}

/// Write `value` as little-endian into `buf` at `offset`. Panics if `buf`
/// does not have room, which is a programmer error (callers always size
/// their scratch buffers up front).
pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Adler-32 with the standard `MOD_ADLER = 65521` and seed `1`, matching
/// the checksum EWF calls a "CRC" on the section descriptor, the table/
/// table2 entry blocks, and every uncompressed chunk's trailer.
pub fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65521;

    let mut a: u32 = 1;
    let mut b: u32 = 0;

    // Process in blocks small enough that neither accumulator can overflow
    // a u32 before the next reduction mod 65521 (the classic NMAX trick).
    const NMAX: usize = 5552;
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a = a.wrapping_add(byte as u32);
            b = b.wrapping_add(a);
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }

    (b << 16) | a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adler32_of_empty_is_one() {
        assert_eq!(adler32(&[]), 1);
    }

    #[test]
    fn adler32_matches_known_vector() {
        // "Wikipedia" -> 0x11E60398 is the textbook worked example.
        assert_eq!(adler32(b"Wikipedia"), 0x11E60398);
    }

    #[test]
    fn roundtrip_u32() {
        let mut buf = [0u8; 4];
        write_u32(&mut buf, 0, 0xdead_beef);
        assert_eq!(read_u32(&buf, 0).unwrap(), 0xdead_beef);
    }

    #[test]
    fn read_past_end_errors() {
        let buf = [0u8; 2];
        assert!(read_u32(&buf, 0).is_err());
    }
}
