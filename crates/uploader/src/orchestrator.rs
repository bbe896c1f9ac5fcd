//! Upload session orchestrator.
//!
//! Drives one file through `begin → hashing → resume-check → uploading →
//! finishing → done`, emitting lifecycle events on the way. Any failure
//! moves the session to `error`, is emitted once as an `error` event and is
//! returned to the caller. Nothing is retried automatically; calling
//! [`Uploader::upload`] again resumes from whatever the server kept.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bigfile_protocol::{FinishQuery, Route};
use bigfile_transfer::{ChunkPlan, calculate_file_checksum, file_identity};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::UploaderConfig;
use crate::error::{ReplyError, UploadError};
use crate::events::{EventBus, EventKind, ListenerId, UploadEvent};
use crate::negotiator::ResumeNegotiator;
use crate::session::{SessionState, UploadSession};
use crate::transport::{Transport, decode_reply};
use crate::transporter::ChunkTransporter;

/// Summary of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub identity: String,
    pub filename: String,
    pub chunk_count: u64,
    /// Chunks sent by this session.
    pub uploaded: usize,
    /// Chunks the server already held.
    pub skipped: usize,
}

/// Uploads files through a [`Transport`].
///
/// One upload runs at a time per `Uploader`; the state reported by
/// [`state`](Self::state) belongs to the most recent one.
pub struct Uploader {
    transport: Arc<dyn Transport>,
    config: UploaderConfig,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
}

impl Uploader {
    pub fn new(transport: Arc<dyn Transport>, config: UploaderConfig) -> Result<Self, UploadError> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            events: Arc::new(EventBus::new()),
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState::Idle),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribes to lifecycle events. See [`EventBus::on`].
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&UploadEvent<'_>) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Unsubscribes a listener. See [`EventBus::off`].
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    /// Token that aborts the running upload.
    ///
    /// Cancellation is permanent: every later upload on this `Uploader`
    /// fails with [`UploadError::Cancelled`]. Create a new `Uploader` to
    /// retry; the server keeps the chunks already stored.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uploads `path` under its own file name.
    pub async fn upload(&self, path: &Path) -> Result<UploadReport, UploadError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Config(format!("no file name in {}", path.display())))?
            .to_string();
        self.upload_as(path, &filename).await
    }

    /// Uploads `path`, asking the server to store it as `filename`.
    pub async fn upload_as(&self, path: &Path, filename: &str) -> Result<UploadReport, UploadError> {
        self.set_state(SessionState::Begin);
        self.events.emit(&UploadEvent::Begin);

        match self.run(path, filename).await {
            Ok(report) => {
                self.set_state(SessionState::Done);
                info!(
                    identity = %report.identity,
                    filename = %report.filename,
                    uploaded = report.uploaded,
                    skipped = report.skipped,
                    "upload complete"
                );
                self.events.emit(&UploadEvent::Finish);
                Ok(report)
            }
            Err(e) => {
                self.set_state(SessionState::Error);
                error!(path = %path.display(), error = %e, "upload failed");
                self.events.emit(&UploadEvent::Error(&e));
                Err(e)
            }
        }
    }

    async fn run(&self, path: &Path, filename: &str) -> Result<UploadReport, UploadError> {
        self.check_cancelled()?;
        let size = tokio::fs::metadata(path).await?.len();
        if size == 0 {
            return Err(UploadError::EmptyFile);
        }
        let plan = ChunkPlan::new(size, self.config.chunk_size)?;

        // Hashing.
        self.set_state(SessionState::Hashing);
        let identity = self.hash(path.to_path_buf()).await?;
        let checksum = if self.config.verify_checksum {
            let source = path.to_path_buf();
            let digest = tokio::task::spawn_blocking(move || calculate_file_checksum(&source))
                .await?
                .map_err(UploadError::Hash)?;
            Some(digest)
        } else {
            None
        };
        self.check_cancelled()?;

        // Resume check.
        self.set_state(SessionState::ResumeCheck);
        let present = ResumeNegotiator::new(self.transport.as_ref(), &self.config.prefix)
            .negotiate(&identity)
            .await?;

        let session = UploadSession {
            path: path.to_path_buf(),
            filename: filename.to_string(),
            plan,
            identity,
            present,
            checksum,
        };
        let skipped = session.chunk_count() as usize - session.missing().len();

        // Uploading.
        self.set_state(SessionState::Uploading);
        let transporter = ChunkTransporter::new(
            self.transport.as_ref(),
            &self.config.prefix,
            self.config.concurrency,
            self.config.verify_checksum,
            self.cancel.clone(),
        );
        let uploaded = transporter
            .upload_missing(&session, |n| {
                self.events.emit(&UploadEvent::UploadProgress(n))
            })
            .await?;
        self.check_cancelled()?;

        // Finishing.
        self.set_state(SessionState::Finishing);
        self.finish(&session).await?;

        Ok(UploadReport {
            identity: session.identity,
            filename: session.filename,
            chunk_count: session.plan.chunk_count(),
            uploaded,
            skipped,
        })
    }

    async fn hash(&self, path: PathBuf) -> Result<String, UploadError> {
        let events = Arc::clone(&self.events);
        tokio::task::spawn_blocking(move || {
            file_identity(&path, |n| events.emit(&UploadEvent::HashProgress(n)))
        })
        .await?
        .map_err(UploadError::Hash)
    }

    async fn finish(&self, session: &UploadSession) -> Result<(), UploadError> {
        let query = FinishQuery {
            hash: session.identity.clone(),
            filename: session.filename.clone(),
            checksum: session.checksum.clone(),
        };
        let path = Route::Finish.path(&self.config.prefix);

        // The payload, if any, is not interpreted.
        self.transport
            .get(&path, query.to_query())
            .await
            .map_err(ReplyError::from)
            .and_then(decode_reply::<serde_json::Value>)
            .map_err(UploadError::finish)?;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A dropped upload future leaves its last phase behind.
        if !state.can_advance_to(next) {
            warn!(from = ?*state, to = ?next, "unexpected session transition");
        }
        *state = next;
    }
}
