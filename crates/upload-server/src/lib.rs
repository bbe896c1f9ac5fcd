//! Server side of resumable chunked uploads.
//!
//! Chunks are staged under `{storageRoot}/{identity}/{index}` by the
//! [`ChunkStore`] and concatenated into `{storageRoot}/{filename}` by the
//! [`Reassembler`]. [`UploadService`] maps the three upload routes onto
//! those two components and wraps every outcome in an
//! [`Envelope`](bigfile_protocol::Envelope). The HTTP server itself is not
//! part of this crate; it hands parsed requests to the service.

mod config;
mod locks;
mod manifest;
mod reassembler;
mod service;
mod store;

pub use config::StoreConfig;
pub use locks::IdentityLocks;
pub use manifest::{MANIFEST_FILE, Manifest};
pub use reassembler::{MergeReport, Reassembler};
pub use service::{IncomingForm, IncomingRequest, UploadService};
pub use store::{ChunkStore, StagedChunks, is_housekeeping};

use bigfile_protocol::{ChunkIndex, ErrorCode, ProtocolError};
use bigfile_transfer::TransferError;

/// Errors produced by the chunk store and the reassembler.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad request: {0}")]
    BadRequest(#[from] ProtocolError),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("chunk checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("total mismatch: staged upload expects {expected} chunks, request says {got}")]
    TotalMismatch { expected: u64, got: u64 },

    #[error("no staged chunks for {0}")]
    NoStagedChunks(String),

    #[error("missing {count} of {total} chunks, first missing is {first}")]
    MissingChunks {
        first: ChunkIndex,
        count: u64,
        total: u64,
    },

    #[error("unexpected entry in staging directory: {0:?}")]
    UnexpectedEntry(String),

    #[error("chunk {index} out of range (total {total})")]
    IndexOutOfRange { index: ChunkIndex, total: u64 },

    #[error("assembled file checksum mismatch: expected {expected}, got {actual}")]
    OutputChecksumMismatch { expected: String, actual: String },

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Envelope code for this error. Malformed input is always
    /// [`ErrorCode::BadRequest`]; everything else reports `fallback`, the
    /// code of the operation that failed.
    pub fn code(&self, fallback: ErrorCode) -> ErrorCode {
        match self {
            StoreError::BadRequest(_) | StoreError::InvalidName(_) => ErrorCode::BadRequest,
            _ => fallback,
        }
    }
}

impl From<TransferError> for StoreError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => StoreError::Io(e),
            TransferError::InvalidName(name) => StoreError::InvalidName(name),
            TransferError::ChecksumMismatch { expected, actual } => {
                StoreError::ChecksumMismatch { expected, actual }
            }
            other => StoreError::Io(std::io::Error::other(other)),
        }
    }
}
