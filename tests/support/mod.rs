//! Shared helpers for the integration tests: digest adapters the library
//! deliberately doesn't ship (spec §1 Non-goal), and a minimal section-chain
//! walker used to poke at raw segment-file bytes for the table2-divergence
//! scenario, mirroring the on-disk layout documented in `src/ewf/section.rs`
//! and `src/ewf/table_section.rs`.

use exhume_ewf::MediaDigest;
use md5::{Digest as _, Md5};
use sha1::Sha1;

pub struct Md5Digest(Md5);

impl Md5Digest {
    pub fn new() -> Self {
        Self(Md5::new())
    }
}

impl MediaDigest for Md5Digest {
    fn algorithm_name(&self) -> &'static str {
        "MD5"
    }

    fn update(&mut self, data: &[u8]) {
        md5::Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

pub struct Sha1Digest(Sha1);

impl Sha1Digest {
    pub fn new() -> Self {
        Self(Sha1::new())
    }
}

impl MediaDigest for Sha1Digest {
    fn algorithm_name(&self) -> &'static str {
        "SHA1"
    }

    fn update(&mut self, data: &[u8]) {
        sha1::Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Adler-32, the same checksum every section/table payload in this format
/// is guarded by.
pub fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + byte as u32) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

/// Walk a segment file's 76-byte section-descriptor chain (file header is
/// always 13 bytes) and return `(payload_offset, payload_len)` for the
/// first section whose type tag matches `type_name`.
pub fn find_section(raw: &[u8], type_name: &str) -> Option<(usize, usize)> {
    let mut offset = 13usize;
    loop {
        if offset + 76 > raw.len() {
            return None;
        }
        let descriptor = &raw[offset..offset + 76];
        let nul = descriptor[0..16].iter().position(|&b| b == 0).unwrap_or(16);
        let type_str = std::str::from_utf8(&descriptor[0..nul]).unwrap_or("");
        let next_offset = read_u64(descriptor, 16) as usize;
        let size = read_u64(descriptor, 24) as usize;
        let is_match = type_str == type_name;
        let is_terminator = type_str == "next" || type_str == "done";
        if is_match {
            return Some((offset + 76, size.saturating_sub(76)));
        }
        if is_terminator || next_offset == offset {
            return None;
        }
        offset = next_offset;
    }
}

/// Flip the single-chunk table/table2 payload's only entry to point
/// `delta` bytes further into the section than it really does, and
/// recompute the trailing entries checksum so the payload still parses —
/// it just disagrees with its sibling table about where chunk 0 lives.
pub fn nudge_single_entry_offset(payload: &mut [u8], delta: u32) {
    const TABLE_HEADER_SIZE: usize = 36;
    let raw = read_u32(payload, TABLE_HEADER_SIZE);
    let compressed_bit = raw & 0x8000_0000;
    let offset_bits = raw & 0x7FFF_FFFF;
    write_u32(payload, TABLE_HEADER_SIZE, compressed_bit | (offset_bits + delta));
    let entries_checksum = adler32(&payload[TABLE_HEADER_SIZE..TABLE_HEADER_SIZE + 4]);
    write_u32(payload, TABLE_HEADER_SIZE + 4, entries_checksum);
}
