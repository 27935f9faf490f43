//! Wire layout for the `hash`, `digest` and `xhash` sections. `hash` only
//! ever carried MD5 in the oldest images; `digest` added SHA-1 alongside
//! it; `xhash` is the same zlib-compressed-XML framing `xheader` uses,
//! keyed by algorithm name, so newer digests (SHA-256, BLAKE, …) fit
//! without a wire-format change.

use crate::ewf::codec::adler32;
use crate::ewf::error::{Error, Result};
use crate::ewf::values::{self, ValueTable};

pub const HASH_SECTION_SIZE: usize = 16 + 4; // md5 + checksum
pub const DIGEST_SECTION_SIZE: usize = 16 + 20 + 4 + 4; // md5 + sha1 + reserved + checksum

/// Build the plain `hash` section payload from whatever MD5 bytes the
/// caller's digest set produced (16 bytes expected; shorter/missing
/// digests are zero-padded so the wire layout stays fixed-size).
pub fn build_hash_section(md5: Option<&[u8]>) -> [u8; HASH_SECTION_SIZE] {
    let mut buf = [0u8; HASH_SECTION_SIZE];
    if let Some(md5) = md5 {
        let n = md5.len().min(16);
        buf[0..n].copy_from_slice(&md5[..n]);
    }
    let checksum = adler32(&buf[0..16]);
    crate::ewf::codec::write_u32(&mut buf, 16, checksum);
    buf
}

pub fn parse_hash_section(buf: &[u8]) -> Result<[u8; 16]> {
    if buf.len() < HASH_SECTION_SIZE {
        return Err(Error::CorruptSection("hash section truncated".into()));
    }
    let stored = crate::ewf::codec::read_u32(buf, 16)?;
    let computed = adler32(&buf[0..16]);
    if stored != computed {
        return Err(Error::ChecksumMismatch {
            context: "hash section".into(),
            expected: stored,
            computed,
        });
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&buf[0..16]);
    Ok(md5)
}

pub fn build_digest_section(md5: Option<&[u8]>, sha1: Option<&[u8]>) -> [u8; DIGEST_SECTION_SIZE] {
    let mut buf = [0u8; DIGEST_SECTION_SIZE];
    if let Some(md5) = md5 {
        let n = md5.len().min(16);
        buf[0..n].copy_from_slice(&md5[..n]);
    }
    if let Some(sha1) = sha1 {
        let n = sha1.len().min(20);
        buf[16..16 + n].copy_from_slice(&sha1[..n]);
    }
    let checksum = adler32(&buf[0..36]);
    crate::ewf::codec::write_u32(&mut buf, 36, checksum);
    buf
}

pub fn parse_digest_section(buf: &[u8]) -> Result<([u8; 16], [u8; 20])> {
    if buf.len() < DIGEST_SECTION_SIZE {
        return Err(Error::CorruptSection("digest section truncated".into()));
    }
    let stored = crate::ewf::codec::read_u32(buf, 36)?;
    let computed = adler32(&buf[0..36]);
    if stored != computed {
        return Err(Error::ChecksumMismatch {
            context: "digest section".into(),
            expected: stored,
            computed,
        });
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&buf[0..16]);
    let mut sha1 = [0u8; 20];
    sha1.copy_from_slice(&buf[16..36]);
    Ok((md5, sha1))
}

/// `xhash` reuses the zlib-compressed-XML framing, keyed by algorithm
/// name to hex digest — any digest the caller's [`DigestSet`](crate::ewf::hashing::DigestSet)
/// produced round-trips through it, not just MD5/SHA-1.
pub fn build_xhash(digests: &[(&'static str, Vec<u8>)]) -> Vec<u8> {
    let mut values = ValueTable::new();
    for (name, bytes) in digests {
        values.set(*name, hex_encode(bytes));
    }
    values::emit_xheader(&values)
}

pub fn parse_xhash(raw: &[u8]) -> Result<ValueTable> {
    values::parse_xheader(raw)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
