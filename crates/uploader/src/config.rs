//! Uploader configuration.

use std::path::Path;

use bigfile_protocol::constants::DEFAULT_PREFIX;
use bigfile_transfer::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Client-side settings. Loaded from JSON with camelCase keys; every key
/// is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploaderConfig {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Route prefix; must match the server's.
    pub prefix: String,
    /// Chunks in flight at once. `1` sends chunks strictly in ascending
    /// order, one at a time.
    pub concurrency: usize,
    /// Send SHA-256 digests with every chunk and with the finish request.
    pub verify_checksum: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            prefix: DEFAULT_PREFIX.into(),
            concurrency: 1,
            verify_checksum: false,
        }
    }
}

impl UploaderConfig {
    /// Loads configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let config: Self = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| UploadError::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::Config("chunkSize must be greater than zero".into()));
        }
        if self.concurrency == 0 {
            return Err(UploadError::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
