//! Per-identity staging manifest.
//!
//! Records the chunk count announced by the first stored chunk so the
//! reassembler can tell a complete upload from one with trailing chunks
//! missing.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// File name of the manifest inside a staging directory.
pub const MANIFEST_FILE: &str = ".manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Expected number of chunks.
    pub total: u64,
}

impl Manifest {
    /// Reads the manifest in `staging_dir`, if one was written.
    pub fn read(staging_dir: &Path) -> Result<Option<Self>, StoreError> {
        match std::fs::read(staging_dir.join(MANIFEST_FILE)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the manifest atomically (temp file, then rename).
    pub fn write(&self, staging_dir: &Path) -> Result<(), StoreError> {
        let tmp = staging_dir.join(format!("{MANIFEST_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        let result = (|| -> Result<(), StoreError> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(self)?)?;
            file.sync_all()?;
            std::fs::rename(&tmp, staging_dir.join(MANIFEST_FILE))?;
            Ok(())
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }

    /// Records `total` for the staging directory, rejecting a total that
    /// conflicts with the one already recorded.
    pub fn record_total(staging_dir: &Path, total: u64) -> Result<(), StoreError> {
        match Self::read(staging_dir)? {
            Some(existing) if existing.total == total => Ok(()),
            Some(existing) => Err(StoreError::TotalMismatch {
                expected: existing.total,
                got: total,
            }),
            None => Manifest { total }.write(staging_dir),
        }
    }
}
