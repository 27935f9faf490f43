//! Deflate encode/decode plus the "empty block" detector that forces
//! compression of an all-equal-bytes chunk even when the image as a whole
//! is being written uncompressed (spec §4.2) — this is what keeps sparse
//! media from costing a full chunk per zero-filled run.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

use crate::ewf::error::{Error, Result};
use crate::ewf::format::CompressionLevel;

/// Zlib-deflate `data` at `level`. Returns the full zlib stream (header +
/// deflate blocks + trailing Adler-32), matching what EWF stores verbatim
/// as a compressed chunk's payload.
pub fn deflate(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level.to_flate2());
    encoder
        .write_all(data)
        .map_err(|e| Error::CompressionFailure(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::CompressionFailure(e.to_string()))
}

/// Inflate a full zlib stream back to plaintext.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::DecompressionFailure(e.to_string()))?;
    Ok(out)
}

/// `true` if every byte in `chunk` is identical (the empty-block case —
/// all-zero sparse runs are the overwhelmingly common instance, but any
/// constant byte qualifies).
pub fn is_empty_block(chunk: &[u8]) -> bool {
    match chunk.first() {
        None => true,
        Some(&first) => chunk.iter().all(|&b| b == first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = deflate(&data, CompressionLevel::Best).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn empty_block_detection() {
        assert!(is_empty_block(&[0u8; 4096]));
        assert!(is_empty_block(&[0xffu8; 16]));
        assert!(is_empty_block(&[]));
        let mut not_empty = vec![0u8; 4096];
        not_empty[4095] = 1;
        assert!(!is_empty_block(&not_empty));
    }
}
