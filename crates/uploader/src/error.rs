//! Uploader error types.

use bigfile_protocol::ChunkIndex;
use bigfile_transfer::TransferError;

/// Failure reported by a [`Transport`](crate::Transport) implementation
/// before any response was received.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Why a single request did not produce a usable reply.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status} {text}")]
    Status { status: u16, text: String },

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("server rejected request ({code}): {message}")]
    Rejected { code: String, message: String },
}

/// Errors that abort an upload session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("hashing failed: {0}")]
    Hash(#[source] TransferError),

    #[error("existence check failed: {0}")]
    Negotiation(#[source] ReplyError),

    #[error("chunk {index} failed: {source}")]
    ChunkTransfer {
        index: ChunkIndex,
        #[source]
        source: ReplyError,
    },

    #[error("finish failed: {0}")]
    Finish(#[source] ReplyError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancelled,

    #[error("file is empty")]
    EmptyFile,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl UploadError {
    pub(crate) fn negotiation(err: ReplyError) -> Self {
        match err {
            ReplyError::Malformed(e) => UploadError::Protocol(e.to_string()),
            other => UploadError::Negotiation(other),
        }
    }

    pub(crate) fn chunk(index: ChunkIndex, err: ReplyError) -> Self {
        match err {
            ReplyError::Malformed(e) => UploadError::Protocol(format!("chunk {index}: {e}")),
            source => UploadError::ChunkTransfer { index, source },
        }
    }

    pub(crate) fn finish(err: ReplyError) -> Self {
        match err {
            ReplyError::Malformed(e) => UploadError::Protocol(e.to_string()),
            other => UploadError::Finish(other),
        }
    }
}
