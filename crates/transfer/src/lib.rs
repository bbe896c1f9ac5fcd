//! File identity, chunk planning and chunk extraction.
//!
//! Everything here is synchronous `std::fs` work; async callers run it on
//! `tokio::task::spawn_blocking`.

mod chunked;
mod hasher;
mod planner;
mod validation;

pub use chunked::{Chunk, ChunkReader, calculate_file_checksum, checksum_bytes};
pub use hasher::{SAMPLE_COUNT, SAMPLE_SIZE, file_identity, identity_from_reader, sample_ranges};
pub use planner::ChunkPlan;
pub use validation::{validate_filename, validate_identity};

use bigfile_protocol::ChunkIndex;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("chunk {index} out of range (chunk count {count})")]
    ChunkOutOfRange { index: ChunkIndex, count: u64 },

    #[error("file size changed: planned {expected} bytes, found {actual}")]
    SizeChanged { expected: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid name: {0}")]
    InvalidName(String),
}
