//! Final reassembly of staged chunks.
//!
//! The merge validates the staged set before writing a byte, writes the
//! output under a hidden temp name and renames it into place only after the
//! whole file (and its optional checksum) checks out. Any failure leaves
//! the staging directory untouched so the upload can be resumed.

use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bigfile_protocol::ChunkIndex;
use bigfile_transfer::validate_filename;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::StoreError;
use crate::config::StoreConfig;
use crate::locks::IdentityLocks;
use crate::manifest::Manifest;
use crate::store::{ChunkStore, list_staged};

/// Outcome of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Path of the assembled file.
    pub path: PathBuf,
    pub chunks: u64,
    pub bytes: u64,
    /// SHA-256 hex digest of the assembled file.
    pub checksum: String,
}

/// Concatenates `{storage_root}/{identity}/0..N-1` into
/// `{storage_root}/{filename}`.
#[derive(Debug, Clone)]
pub struct Reassembler {
    store: ChunkStore,
    root: PathBuf,
    scratch_dir: String,
    locks: Arc<IdentityLocks>,
}

impl Reassembler {
    /// `locks` must be the set shared with the [`ChunkStore`] writing into
    /// the same storage root.
    pub fn new(config: &StoreConfig, locks: Arc<IdentityLocks>) -> Self {
        Self {
            store: ChunkStore::new(config, Arc::clone(&locks)),
            root: config.storage_root.clone(),
            scratch_dir: config.scratch_dir.clone(),
            locks,
        }
    }

    fn check_filename(&self, filename: &str) -> Result<(), StoreError> {
        validate_filename(filename)?;
        if filename == self.scratch_dir {
            return Err(StoreError::InvalidName(format!(
                "filename collides with scratch directory: {filename}"
            )));
        }
        Ok(())
    }

    /// Merges the chunks staged for `identity` into `filename` and retires
    /// the staging directory.
    ///
    /// When `checksum` is given, the SHA-256 of the assembled bytes must
    /// match it.
    pub async fn merge(
        &self,
        identity: &str,
        filename: &str,
        checksum: Option<String>,
    ) -> Result<MergeReport, StoreError> {
        self.store.check_identity(identity)?;
        self.check_filename(filename)?;

        let _guard = self.locks.write(identity).await;
        let staging = self.store.staging_dir(identity);
        let root = self.root.clone();
        let identity_owned = identity.to_string();
        let target = self.root.join(filename);

        let report = tokio::task::spawn_blocking(move || {
            merge_blocking(&root, &staging, &identity_owned, &target, checksum)
        })
        .await??;

        info!(
            identity,
            path = %report.path.display(),
            chunks = report.chunks,
            bytes = report.bytes,
            "file merged"
        );
        Ok(report)
    }
}

fn merge_blocking(
    root: &Path,
    staging: &Path,
    identity: &str,
    target: &Path,
    checksum: Option<String>,
) -> Result<MergeReport, StoreError> {
    if !staging.is_dir() {
        return Err(StoreError::NoStagedChunks(identity.to_string()));
    }

    let listing = list_staged(staging)?;
    if let Some(name) = listing.unexpected.into_iter().next() {
        return Err(StoreError::UnexpectedEntry(name));
    }
    let Some(highest) = listing.indices.last().copied() else {
        return Err(StoreError::NoStagedChunks(identity.to_string()));
    };

    let total = match Manifest::read(staging)? {
        Some(manifest) => manifest.total,
        None => highest.get() + 1,
    };
    if highest.get() >= total {
        return Err(StoreError::IndexOutOfRange {
            index: highest,
            total,
        });
    }
    let missing = total - listing.indices.len() as u64;
    if missing > 0 {
        let first = (0..total)
            .map(ChunkIndex::new)
            .find(|i| !listing.indices.contains(i))
            .unwrap_or(highest);
        return Err(StoreError::MissingChunks {
            first,
            count: missing,
            total,
        });
    }

    // Fixed-length name; the target name may already be near NAME_MAX.
    let tmp = root.join(format!(".{}.merging", uuid::Uuid::new_v4()));
    let (bytes, actual) = match concatenate(staging, total, &tmp) {
        Ok(written) => written,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
    };

    if let Some(expected) = checksum {
        if !actual.eq_ignore_ascii_case(&expected) {
            let _ = std::fs::remove_file(&tmp);
            return Err(StoreError::OutputChecksumMismatch { expected, actual });
        }
    }

    if let Err(e) = std::fs::rename(&tmp, target) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    // The output is in place; a leftover staging directory only costs disk.
    if let Err(e) = std::fs::remove_dir_all(staging) {
        warn!(identity, error = %e, "failed to remove staging directory after merge");
    }

    Ok(MergeReport {
        path: target.to_path_buf(),
        chunks: total,
        bytes,
        checksum: actual,
    })
}

/// Writes chunks `0..total` of `staging` into `out`, returning the byte
/// count and SHA-256 of what was written.
fn concatenate(staging: &Path, total: u64, out: &Path) -> Result<(u64, String), StoreError> {
    let file = std::fs::File::create(out)?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut bytes = 0u64;

    for index in (0..total).map(ChunkIndex::new) {
        let mut chunk = std::fs::File::open(staging.join(index.to_string()))?;
        loop {
            let n = chunk.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n])?;
            bytes += n as u64;
        }
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok((bytes, hex::encode(hasher.finalize())))
}
