use std::collections::BTreeSet;
use std::path::PathBuf;

use bigfile_protocol::ChunkIndex;
use bigfile_transfer::ChunkPlan;

/// Phase of an upload session. Phases advance linearly; `Error` is
/// reachable from any phase that is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Begin,
    Hashing,
    ResumeCheck,
    Uploading,
    Finishing,
    Done,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Error)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle | Done | Error, Begin) => true,
            (Begin, Hashing)
            | (Hashing, ResumeCheck)
            | (ResumeCheck, Uploading)
            | (Uploading, Finishing)
            | (Finishing, Done) => true,
            (from, Error) => !from.is_terminal() && *from != Idle,
            _ => false,
        }
    }
}

/// One attempt at uploading one file. Lives in memory only; a new session
/// for the same file rebuilds it from the file and the server's listing.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub path: PathBuf,
    pub filename: String,
    pub plan: ChunkPlan,
    pub identity: String,
    /// Indices the server already holds.
    pub present: BTreeSet<ChunkIndex>,
    /// SHA-256 of the whole file, when checksums are enabled.
    pub checksum: Option<String>,
}

impl UploadSession {
    pub fn chunk_count(&self) -> u64 {
        self.plan.chunk_count()
    }

    /// Planned indices the server does not hold, ascending.
    pub fn missing(&self) -> Vec<ChunkIndex> {
        self.plan
            .indices()
            .filter(|i| !self.present.contains(i))
            .collect()
    }
}
