pub mod ewf;

pub use ewf::{
    ChunkDescriptor, ChunkFlags, CompressionLevel, DateFormat, DigestSet, Error, ErrorTolerance,
    EwfHandle, Format, MediaDigest, MediaFlags, MediaType, MediaValues, Result, SectorRange,
    SectorRangeTable, ValueTable,
};
