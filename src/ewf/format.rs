//! The enums that parameterize the rest of the engine: on-disk flavour,
//! compression level, and the four legacy date renderings used by the
//! header value serializers.

/// Which concrete EWF flavour we are reading/writing. Controls the file
/// header magic, whether a `table2` mirror is emitted, the maximum number
/// of offset-table entries per chunks section, and the segment-file size
/// ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Ewf,
    SmartS01,
    EnCase1,
    EnCase2,
    EnCase3,
    EnCase4,
    EnCase5,
    EnCase6,
    EnCase7,
    Linen5,
    Linen6,
    Ftk,
    Lvf,
    Ewfx,
}

impl Format {
    /// `EWF_MAXIMUM_OFFSETS_IN_TABLE`-equivalent cap. `EnCase6`/`EnCase7`
    /// raise it; `Ewfx` has no hard cap (the writer still rolls over to
    /// bound memory, it just isn't forced by the format).
    pub fn max_offsets_in_table(self) -> u32 {
        match self {
            Format::EnCase6 | Format::EnCase7 | Format::Linen6 => 65_534,
            Format::Ewfx => u32::MAX,
            _ => 16_375,
        }
    }

    /// Whether this flavour writes a `table2` mirror after every `table`.
    pub fn writes_table2(self) -> bool {
        !matches!(self, Format::SmartS01 | Format::EnCase1)
    }

    /// `segment_file_size` ceiling in bytes.
    pub fn maximum_segment_file_size(self) -> u64 {
        match self {
            Format::EnCase6 | Format::EnCase7 | Format::Ewfx => i64::MAX as u64,
            _ => i32::MAX as u64,
        }
    }

    /// Maximum number of segment files addressable by this flavour's
    /// filename extension cycle.
    pub fn maximum_segment_number(self) -> u32 {
        match self {
            Format::SmartS01 => ('z' as u32 - 's' as u32) * 26 * 26 + 99,
            _ => ('Z' as u32 - 'E' as u32) * 26 * 26 + 99,
        }
    }
}

/// Deflate level. `None` still triggers compression of an all-equal-bytes
/// chunk when `compress_empty_block` is set (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    None,
    Fast,
    Best,
}

impl CompressionLevel {
    pub fn to_flate2(self) -> flate2::Compression {
        match self {
            CompressionLevel::None => flate2::Compression::none(),
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::Best => flate2::Compression::best(),
        }
    }
}

/// Rendering used when formatting `acquiry_date`/`system_date` header
/// values. `Iso8601` is the only unambiguous one; the other three are
/// preserved for round-tripping images written by older EnCase versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    Ctime,
    DayMonth,
    MonthDay,
    Iso8601,
}

/// How a read handles primary/secondary offset-table divergence (spec
/// §4.5, §8 scenario 5). `Compensate` keeps the primary `table` entry and
/// flags the chunk `TAINTED`; `Strict` fails the open outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTolerance {
    Compensate,
    Strict,
}
