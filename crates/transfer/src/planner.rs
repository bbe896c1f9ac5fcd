use std::ops::Range;

use bigfile_protocol::ChunkIndex;

use crate::TransferError;

/// Fixed-size partition of a file into chunks. The last chunk may be
/// shorter than `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        Ok(Self { size, chunk_size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// `ceil(size / chunk_size)`.
    pub fn chunk_count(&self) -> u64 {
        self.size.div_ceil(self.chunk_size)
    }

    /// Byte range of `index`, or `None` past the last chunk.
    pub fn range(&self, index: ChunkIndex) -> Option<Range<u64>> {
        if index.get() >= self.chunk_count() {
            return None;
        }
        let start = index.get() * self.chunk_size;
        let end = (start + self.chunk_size).min(self.size);
        Some(start..end)
    }

    /// All indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = ChunkIndex> + use<> {
        (0..self.chunk_count()).map(ChunkIndex::new)
    }
}
