use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Per-identity reader/writer locks.
///
/// Chunk stores take the lock shared so chunks of one upload land in
/// parallel; the reassembler takes it exclusively so it never lists a
/// staging directory while a chunk is being moved into it. Entries are
/// dropped once no guard references them.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    inner: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `identity` in shared mode.
    pub async fn read(&self, identity: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(identity).read_owned().await
    }

    /// Acquires the lock for `identity` in exclusive mode.
    pub async fn write(&self, identity: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(identity).write_owned().await
    }

    /// Number of identities with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, identity: &str) -> Arc<RwLock<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map holds these: no guard is live and nobody is waiting.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(map.entry(identity.to_string()).or_default())
    }
}
