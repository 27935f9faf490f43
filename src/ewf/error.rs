//! Error kinds for the segment-file engine.
//!
//! Every sub-operation that has a caller-visible recovery path (CRC
//! mismatches on read, secondary-table divergence) is *not* represented
//! here — those are folded into the sector tables by the read/offset-table
//! layers and never reach the public handle as an `Err`. What remains are
//! the faults that abort the current operation.

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("value out of bounds: {0}")]
    ValueOutOfBounds(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    #[error("checksum mismatch in {context}: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        context: String,
        expected: u32,
        computed: u32,
    },

    #[error("primary/secondary offset table mismatch at chunk {chunk}")]
    TableMismatch { chunk: u64 },

    #[error("decompression failure: {0}")]
    DecompressionFailure(String),

    #[error("compression failure: {0}")]
    CompressionFailure(String),

    #[error("corrupt section: {0}")]
    CorruptSection(String),

    #[error("missing section: {0}")]
    MissingSection(String),

    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("operation aborted")]
    Aborted,
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        if let Error::IoFailure(inner) = err {
            return inner;
        }
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}
