//! Wire protocol shared by the uploader and the upload server.
//!
//! Every response is wrapped in an [`Envelope`]; requests are plain query
//! strings (existence check, finish) or multipart forms (chunk upload).
//! [`ChunkIndex`] is the one canonical representation of a chunk index on
//! both sides of the wire.

pub mod constants;
pub mod envelope;
pub mod index;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::{ErrorCode, Route};
pub use envelope::Envelope;
pub use index::ChunkIndex;
pub use messages::{CheckExistsQuery, ChunkFields, ExistsResponse, FinishQuery};

/// Errors produced while decoding protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("invalid chunk index: {0:?}")]
    InvalidIndex(String),
}
