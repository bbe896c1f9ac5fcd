use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bigfile_protocol::ChunkIndex;
use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::planner::ChunkPlan;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// A chunk extracted from the source file.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: ChunkIndex,
    pub offset: u64,
    pub data: Vec<u8>,
    /// SHA-256 hex digest of `data`.
    pub checksum: String,
}

/// Extracts chunks of a file by index.
pub struct ChunkReader {
    file: std::fs::File,
    plan: ChunkPlan,
}

impl ChunkReader {
    /// Opens `path` for reading according to `plan`.
    ///
    /// Fails if the file size no longer matches the plan.
    pub fn open(path: &Path, plan: ChunkPlan) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let actual = file.metadata()?.len();
        if actual != plan.size() {
            return Err(TransferError::SizeChanged {
                expected: plan.size(),
                actual,
            });
        }
        Ok(Self { file, plan })
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Reads chunk `index` in full.
    pub fn read_chunk(&mut self, index: ChunkIndex) -> Result<Chunk, TransferError> {
        let range = self
            .plan
            .range(index)
            .ok_or(TransferError::ChunkOutOfRange {
                index,
                count: self.plan.chunk_count(),
            })?;

        let mut data = vec![0u8; (range.end - range.start) as usize];
        self.file.seek(SeekFrom::Start(range.start))?;
        self.file.read_exact(&mut data)?;

        let checksum = checksum_bytes(&data);
        Ok(Chunk {
            index,
            offset: range.start,
            data,
            checksum,
        })
    }
}
