//! Expert Witness Compression Format: segment files, the chunk-addressable
//! offset table, the compression/CRC pipeline, and the streaming writer and
//! random-access reader built on top of them.
//!
//! [`EwfHandle`] is the entry point applications use; everything else here
//! is plumbing it orchestrates.

mod codec;
mod compress;
mod delta;
mod error;
mod format;
mod handle;
mod hash_section;
mod hashing;
mod io_pool;
mod media_values;
mod offset_table;
mod read_io;
mod section;
mod sector_table;
mod segment_file;
mod segment_table;
mod table_section;
mod values;
mod write_io;

pub use error::{Error, Result};
pub use format::{CompressionLevel, DateFormat, ErrorTolerance, Format};
pub use handle::EwfHandle;
pub use hashing::{DigestSet, MediaDigest};
pub use media_values::{MediaFlags, MediaType, MediaValues};
pub use offset_table::{ChunkDescriptor, ChunkFlags};
pub use sector_table::{SectorRange, SectorRangeTable};
pub use values::ValueTable;
