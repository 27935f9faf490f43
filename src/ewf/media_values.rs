//! The media geometry model (spec §3): sector/chunk sizing, total counts,
//! the acquisition's GUID, and the media type/flags bit field. Immutable
//! once the first chunk has been written (enforced by the handle's
//! `values_initialized` guard, not by this type itself).

use crate::ewf::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Removable,
    Fixed,
    Optical,
    Memory,
    LogicalFiles,
}

impl MediaType {
    pub fn to_wire(self) -> u8 {
        match self {
            MediaType::Removable => 0x00,
            MediaType::Fixed => 0x01,
            MediaType::Optical => 0x03,
            MediaType::Memory => 0x10,
            MediaType::LogicalFiles => 0x0e,
        }
    }

    pub fn from_wire(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => MediaType::Removable,
            0x01 => MediaType::Fixed,
            0x03 => MediaType::Optical,
            0x10 => MediaType::Memory,
            0x0e => MediaType::LogicalFiles,
            other => {
                return Err(Error::Unsupported(format!(
                    "unknown media type byte {other:#04x}"
                )))
            }
        })
    }
}

bitflags::bitflags! {
    /// Bit field: image-vs-device, physical-vs-logical, write-blocker hints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MediaFlags: u8 {
        const IMAGE = 0x01;
        const PHYSICAL = 0x02;
        const FASTBLOC_WRITE_BLOCKED = 0x04;
        const TABLEAU_WRITE_BLOCKED = 0x08;
    }
}

/// Immutable-after-init media geometry. See spec §3 for invariants.
#[derive(Debug, Clone)]
pub struct MediaValues {
    pub media_type: MediaType,
    pub media_flags: MediaFlags,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub number_of_sectors: u64,
    pub set_identifier: [u8; 16],
    pub error_granularity: u32,
    pub compression_level_hint: u8,
}

impl MediaValues {
    pub fn new(sectors_per_chunk: u32, bytes_per_sector: u32) -> Result<Self> {
        let values = Self {
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::IMAGE | MediaFlags::PHYSICAL,
            sectors_per_chunk,
            bytes_per_sector,
            number_of_sectors: 0,
            set_identifier: *uuid::Uuid::new_v4().as_bytes(),
            error_granularity: 64,
            compression_level_hint: 0,
        };
        values.chunk_size()?;
        Ok(values)
    }

    /// `chunk_size = sectors_per_chunk × bytes_per_sector`, required to fit
    /// in 32 bits (spec §3 invariant).
    pub fn chunk_size(&self) -> Result<u32> {
        let size = self.sectors_per_chunk as u64 * self.bytes_per_sector as u64;
        if size == 0 {
            return Err(Error::InvalidArgument(
                "chunk size must be non-zero".into(),
            ));
        }
        if size > i32::MAX as u64 {
            return Err(Error::ValueOutOfBounds(format!(
                "chunk size {size} exceeds INT32_MAX"
            )));
        }
        Ok(size as u32)
    }

    pub fn media_size(&self) -> u64 {
        self.number_of_sectors * self.bytes_per_sector as u64
    }

    /// `number_of_chunks` such that `chunk_size × number_of_chunks ≥
    /// media_size` and `chunk_size × (number_of_chunks − 1) < media_size`
    /// (spec §8 invariant 6) — i.e. a ceiling division, with at least one
    /// chunk for a zero-sized (streaming, not-yet-known) image.
    pub fn number_of_chunks(&self) -> Result<u64> {
        let chunk_size = self.chunk_size()? as u64;
        let media_size = self.media_size();
        if media_size == 0 {
            return Ok(0);
        }
        Ok((media_size + chunk_size - 1) / chunk_size)
    }

    /// Validates `media_size ≤ chunk_size × (2^32 − 1)` (spec §3).
    pub fn validate(&self) -> Result<()> {
        let chunk_size = self.chunk_size()? as u64;
        let max_media_size = chunk_size * (u32::MAX as u64);
        if self.media_size() > max_media_size {
            return Err(Error::ValueOutOfBounds(format!(
                "media size {} exceeds chunk_size * (2^32 - 1)",
                self.media_size()
            )));
        }
        Ok(())
    }

    /// Serialize the 1052-byte `volume`/`data` section payload (spec §6.1).
    /// `number_of_chunks` and `compression_level` are carried alongside the
    /// geometry fields but are not stored on `MediaValues` itself — the
    /// former is a write-time tally, the latter a handle-level setting.
    pub fn to_volume_payload(&self, number_of_chunks: u32, compression_level: u8) -> [u8; VOLUME_PAYLOAD_SIZE] {
        let mut buf = [0u8; VOLUME_PAYLOAD_SIZE];
        buf[0] = self.media_type.to_wire();
        crate::ewf::codec::write_u32(&mut buf, 4, number_of_chunks);
        crate::ewf::codec::write_u32(&mut buf, 8, self.sectors_per_chunk);
        crate::ewf::codec::write_u32(&mut buf, 12, self.bytes_per_sector);
        crate::ewf::codec::write_u64(&mut buf, 16, self.number_of_sectors);
        buf[36] = self.media_flags.bits();
        buf[52] = compression_level;
        crate::ewf::codec::write_u32(&mut buf, 56, self.error_granularity);
        buf[64..80].copy_from_slice(&self.set_identifier);
        let checksum = crate::ewf::codec::adler32(&buf[0..VOLUME_PAYLOAD_SIZE - 4]);
        crate::ewf::codec::write_u32(&mut buf, VOLUME_PAYLOAD_SIZE - 4, checksum);
        buf
    }

    /// Parse a `volume`/`data` payload back into `(MediaValues,
    /// number_of_chunks, compression_level)`. Both `volume` (EWF1) and
    /// `data` (EWF1 redundant copy / EWF2) sections share this exact
    /// layout, so a single parser serves both (spec §4.3: "validated for
    /// consistency when both appear").
    pub fn from_volume_payload(buf: &[u8]) -> Result<(Self, u32, u8)> {
        if buf.len() < VOLUME_PAYLOAD_SIZE {
            return Err(Error::CorruptSection(format!(
                "volume/data payload truncated: {} bytes",
                buf.len()
            )));
        }
        let stored_checksum = crate::ewf::codec::read_u32(buf, VOLUME_PAYLOAD_SIZE - 4)?;
        let computed = crate::ewf::codec::adler32(&buf[0..VOLUME_PAYLOAD_SIZE - 4]);
        if stored_checksum != computed {
            return Err(Error::ChecksumMismatch {
                context: "volume/data section".into(),
                expected: stored_checksum,
                computed,
            });
        }

        let media_type = MediaType::from_wire(buf[0])?;
        let number_of_chunks = crate::ewf::codec::read_u32(buf, 4)?;
        let sectors_per_chunk = crate::ewf::codec::read_u32(buf, 8)?;
        let bytes_per_sector = crate::ewf::codec::read_u32(buf, 12)?;
        let number_of_sectors = crate::ewf::codec::read_u64(buf, 16)?;
        let media_flags = MediaFlags::from_bits_truncate(buf[36]);
        let compression_level = buf[52];
        let error_granularity = crate::ewf::codec::read_u32(buf, 56)?;
        let mut set_identifier = [0u8; 16];
        set_identifier.copy_from_slice(&buf[64..80]);

        let values = Self {
            media_type,
            media_flags,
            sectors_per_chunk,
            bytes_per_sector,
            number_of_sectors,
            set_identifier,
            error_granularity,
            compression_level_hint: compression_level,
        };
        Ok((values, number_of_chunks, compression_level))
    }
}

/// Size in bytes of the `volume`/`data` section payload (spec §6.1).
pub const VOLUME_PAYLOAD_SIZE: usize = 1052;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_rejects_overflow() {
        let values = MediaValues {
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::IMAGE,
            sectors_per_chunk: u32::MAX,
            bytes_per_sector: 4096,
            number_of_sectors: 0,
            set_identifier: [0; 16],
            error_granularity: 64,
            compression_level_hint: 0,
        };
        assert!(values.chunk_size().is_err());
    }

    #[test]
    fn number_of_chunks_is_ceiling_division() {
        let mut values = MediaValues::new(64, 512).unwrap(); // chunk_size = 32768
        values.number_of_sectors = 1; // 512 bytes, way less than one chunk
        assert_eq!(values.number_of_chunks().unwrap(), 1);
        values.number_of_sectors = 128; // exactly one chunk (65536 bytes / 512)
        assert_eq!(values.media_size(), 65536);
        assert_eq!(values.number_of_chunks().unwrap(), 2);
    }

    #[test]
    fn media_flags_round_trip() {
        let flags = MediaFlags::IMAGE | MediaFlags::PHYSICAL;
        assert!(flags.contains(MediaFlags::IMAGE));
        assert!(flags.contains(MediaFlags::PHYSICAL));
        assert!(!flags.contains(MediaFlags::TABLEAU_WRITE_BLOCKED));
    }

    #[test]
    fn volume_payload_round_trip() {
        let mut values = MediaValues::new(64, 512).unwrap();
        values.number_of_sectors = 1;
        let payload = values.to_volume_payload(1, 1);
        assert_eq!(payload.len(), VOLUME_PAYLOAD_SIZE);
        let (parsed, number_of_chunks, compression_level) =
            MediaValues::from_volume_payload(&payload).unwrap();
        assert_eq!(number_of_chunks, 1);
        assert_eq!(compression_level, 1);
        assert_eq!(parsed.sectors_per_chunk, 64);
        assert_eq!(parsed.bytes_per_sector, 512);
        assert_eq!(parsed.set_identifier, values.set_identifier);
    }

    #[test]
    fn volume_payload_detects_corruption() {
        let values = MediaValues::new(64, 512).unwrap();
        let mut payload = values.to_volume_payload(0, 0);
        payload[0] = 0xAB; // invalid media type byte
        assert!(MediaValues::from_volume_payload(&payload).is_err());
    }
}
