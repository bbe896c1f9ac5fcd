//! Chunk staging.
//!
//! Each upload identity owns a staging directory holding one file per
//! received chunk, named by its canonical index. Chunks are written to a
//! hidden temp file first and renamed into place, so a reader never sees a
//! partial chunk and a retransmitted chunk simply replaces the old one.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bigfile_protocol::ChunkIndex;
use bigfile_transfer::{calculate_file_checksum, validate_identity};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::config::StoreConfig;
use crate::locks::IdentityLocks;
use crate::manifest::Manifest;

/// Returns `true` for staging entries that are never chunks: the manifest,
/// in-flight temp files and OS litter such as `.DS_Store`.
pub fn is_housekeeping(name: &str) -> bool {
    name.starts_with('.')
}

/// What the store holds for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedChunks {
    /// Whether a staging directory exists.
    pub present: bool,
    pub indices: BTreeSet<ChunkIndex>,
}

/// Stores chunks under `{storage_root}/{identity}/{index}`.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
    scratch_dir: String,
    locks: Arc<IdentityLocks>,
}

impl ChunkStore {
    pub fn new(config: &StoreConfig, locks: Arc<IdentityLocks>) -> Self {
        Self {
            root: config.storage_root.clone(),
            scratch_dir: config.scratch_dir.clone(),
            locks,
        }
    }

    /// Staging directory of `identity`.
    pub fn staging_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Rejects identities that are unsafe as a directory name or that would
    /// alias the scratch directory.
    pub fn check_identity(&self, identity: &str) -> Result<(), StoreError> {
        validate_identity(identity)?;
        if identity == self.scratch_dir {
            return Err(StoreError::InvalidName(format!(
                "identity collides with scratch directory: {identity}"
            )));
        }
        Ok(())
    }

    /// Reports whether `identity` has a staging directory and which chunk
    /// indices it holds.
    pub async fn exists(&self, identity: &str) -> Result<StagedChunks, StoreError> {
        self.check_identity(identity)?;
        let _guard = self.locks.read(identity).await;
        let dir = self.staging_dir(identity);

        tokio::task::spawn_blocking(move || -> Result<StagedChunks, StoreError> {
            if !dir.is_dir() {
                return Ok(StagedChunks::default());
            }
            let listing = list_staged(&dir)?;
            for name in &listing.unexpected {
                warn!(dir = %dir.display(), entry = %name, "ignoring unexpected staging entry");
            }
            Ok(StagedChunks {
                present: true,
                indices: listing.indices,
            })
        })
        .await?
    }

    /// Stores `payload` as chunk `index` of `identity`.
    ///
    /// Idempotent: storing the same index again replaces the chunk.
    pub async fn store(
        &self,
        identity: &str,
        index: ChunkIndex,
        payload: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.check_identity(identity)?;
        let _guard = self.locks.read(identity).await;
        let dir = self.staging_dir(identity);
        let bytes = payload.len();

        tokio::task::spawn_blocking(move || write_chunk(&dir, index, &payload)).await??;
        debug!(identity, %index, bytes, "chunk stored");
        Ok(())
    }

    /// Moves an incoming temp file into place as chunk `index` of `identity`.
    ///
    /// When `checksum` is given the file's SHA-256 must match it. The chunk
    /// count is recorded in the staging manifest on first receipt and must
    /// agree on every later chunk. The incoming file is left where it is on
    /// failure; the caller owns its cleanup.
    pub async fn ingest(
        &self,
        identity: &str,
        index: ChunkIndex,
        total: u64,
        incoming: PathBuf,
        checksum: Option<String>,
    ) -> Result<(), StoreError> {
        self.check_identity(identity)?;
        if index.get() >= total {
            return Err(StoreError::IndexOutOfRange { index, total });
        }
        let _guard = self.locks.read(identity).await;
        let dir = self.staging_dir(identity);

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            if let Some(expected) = checksum {
                let actual = calculate_file_checksum(&incoming)?;
                if !actual.eq_ignore_ascii_case(&expected) {
                    return Err(StoreError::ChecksumMismatch { expected, actual });
                }
            }
            std::fs::create_dir_all(&dir)?;
            Manifest::record_total(&dir, total)?;
            move_chunk(&dir, index, &incoming)
        })
        .await??;

        info!(identity, %index, total, "chunk received");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blocking helpers
// ---------------------------------------------------------------------------

/// Contents of a staging directory.
#[derive(Debug, Default)]
pub(crate) struct Listing {
    pub indices: BTreeSet<ChunkIndex>,
    /// Non-housekeeping entries that are not chunk files.
    pub unexpected: Vec<String>,
}

pub(crate) fn list_staged(dir: &Path) -> Result<Listing, StoreError> {
    let mut listing = Listing::default();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_housekeeping(&name) {
            continue;
        }
        match ChunkIndex::parse_canonical(&name) {
            Some(index) if entry.file_type()?.is_file() => {
                listing.indices.insert(index);
            }
            _ => listing.unexpected.push(name),
        }
    }
    Ok(listing)
}

fn temp_chunk_path(dir: &Path, index: ChunkIndex) -> PathBuf {
    dir.join(format!(".{index}.{}.part", uuid::Uuid::new_v4()))
}

fn write_chunk(dir: &Path, index: ChunkIndex, payload: &[u8]) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir)?;
    let tmp = temp_chunk_path(dir, index);
    let result = (|| -> Result<(), StoreError> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(payload)?;
        file.sync_all()?;
        std::fs::rename(&tmp, dir.join(index.to_string()))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn move_chunk(dir: &Path, index: ChunkIndex, incoming: &Path) -> Result<(), StoreError> {
    let tmp = temp_chunk_path(dir, index);
    let result = (|| -> Result<(), StoreError> {
        move_file(incoming, &tmp)?;
        std::fs::rename(&tmp, dir.join(index.to_string()))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Renames `src` onto `dst`, falling back to copy and remove when the two
/// live on different filesystems.
pub(crate) fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(src = %src.display(), error = %rename_err, "rename failed, copying");
            std::fs::copy(src, dst)?;
            std::fs::remove_file(src)
        }
    }
}
