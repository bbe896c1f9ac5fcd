//! Upload lifecycle events.
//!
//! Listeners are registered per [`EventKind`] and called synchronously, in
//! registration order, from whichever task or thread emits the event. A
//! panicking listener is logged and skipped; the remaining listeners still
//! run and the upload is unaffected.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::error::UploadError;

/// Event names listeners subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Begin,
    HashProgress,
    UploadProgress,
    Finish,
    Error,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Begin => "begin",
            EventKind::HashProgress => "hashProgress",
            EventKind::UploadProgress => "uploadProgress",
            EventKind::Finish => "finish",
            EventKind::Error => "error",
        }
    }
}

/// An event emitted during an upload.
#[derive(Debug, Clone, Copy)]
pub enum UploadEvent<'a> {
    Begin,
    /// 1-based count of samples hashed so far.
    HashProgress(usize),
    /// 1-based count of chunks sent by this session so far.
    UploadProgress(usize),
    Finish,
    Error(&'a UploadError),
}

impl UploadEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            UploadEvent::Begin => EventKind::Begin,
            UploadEvent::HashProgress(_) => EventKind::HashProgress,
            UploadEvent::UploadProgress(_) => EventKind::UploadProgress,
            UploadEvent::Finish => EventKind::Finish,
            UploadEvent::Error(_) => EventKind::Error,
        }
    }
}

pub type Listener = Arc<dyn Fn(&UploadEvent<'_>) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listener lists keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (k.name(), v.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&UploadEvent<'_>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribes a listener. Returns `false` if it was not subscribed to
    /// `kind`.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Calls every listener subscribed to the event's kind.
    pub fn emit(&self, event: &UploadEvent<'_>) {
        let kind = event.kind();
        // Snapshot so listeners may call `on`/`off` without deadlocking.
        let snapshot: Vec<Listener> = match self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
        {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(event = kind.name(), "event listener panicked");
            }
        }
    }
}
