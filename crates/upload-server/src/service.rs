//! Request handling for the three upload routes.
//!
//! The HTTP layer parses the query string and, for chunk uploads, the
//! multipart form (spilling the `data` file field into the scratch
//! directory). The service turns those into store and reassembler calls and
//! always answers with an [`Envelope`]; no input makes it panic or return a
//! transport-level error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bigfile_protocol::constants::FIELD_DATA;
use bigfile_protocol::{
    CheckExistsQuery, ChunkFields, ChunkIndex, Envelope, ErrorCode, ExistsResponse,
    FinishQuery, ProtocolError, Route,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::StoreError;
use crate::config::StoreConfig;
use crate::locks::IdentityLocks;
use crate::reassembler::Reassembler;
use crate::store::ChunkStore;

/// A parsed multipart form.
#[derive(Debug, Clone, Default)]
pub struct IncomingForm {
    /// Text fields.
    pub fields: HashMap<String, String>,
    /// Temp file holding the `data` file field, if one was sent.
    pub file: Option<PathBuf>,
}

/// A parsed request: query parameters plus an optional multipart form.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub query: HashMap<String, String>,
    pub form: Option<IncomingForm>,
}

/// Maps upload routes onto the chunk store and the reassembler.
#[derive(Debug, Clone)]
pub struct UploadService {
    config: Arc<StoreConfig>,
    store: ChunkStore,
    reassembler: Reassembler,
}

impl UploadService {
    pub fn new(config: StoreConfig) -> Self {
        let locks = Arc::new(IdentityLocks::new());
        Self {
            store: ChunkStore::new(&config, Arc::clone(&locks)),
            reassembler: Reassembler::new(&config, locks),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Routes a request by path. Returns `None` for paths outside the
    /// configured prefix.
    pub async fn dispatch(&self, path: &str, request: IncomingRequest) -> Option<Envelope> {
        let route = Route::resolve(&self.config.prefix, path)?;
        debug!(route = route.name(), "dispatching upload request");

        let envelope = match route {
            Route::CheckExists => self.check_exists(&request.query).await,
            Route::Finish => self.finish(&request.query).await,
            Route::UploadChunk => match request.form {
                Some(form) => self.upload_chunk(form).await,
                None => Envelope::error(ErrorCode::BadRequest, "multipart form required"),
            },
        };
        Some(envelope)
    }

    /// `checkFileHashExist`: reports the staged chunk indices of `hash`.
    pub async fn check_exists(&self, query: &HashMap<String, String>) -> Envelope {
        match self.try_check_exists(query).await {
            Ok(response) => reply("success", &response, ErrorCode::ExistsFailed),
            Err(e) => failure("existence check", &e, ErrorCode::ExistsFailed, e.to_string()),
        }
    }

    /// `uploadChunk`: moves the uploaded file into the staging directory.
    ///
    /// The incoming temp file is consumed on success and removed on failure.
    pub async fn upload_chunk(&self, form: IncomingForm) -> Envelope {
        let incoming = form.file.clone();
        match self.try_upload_chunk(form).await {
            Ok(index) => reply("upload success", &index.to_string(), ErrorCode::PersistFailed),
            Err(e) => {
                if let Some(path) = &incoming {
                    discard(path).await;
                }
                failure("chunk upload", &e, ErrorCode::PersistFailed, e.to_string())
            }
        }
    }

    /// `uploadFinish`: merges the staged chunks into the named file.
    pub async fn finish(&self, query: &HashMap<String, String>) -> Envelope {
        match self.try_finish(query).await {
            Ok(()) => Envelope::success::<()>("file merge success", None).unwrap_or_else(|e| {
                Envelope::error(ErrorCode::MergeFailed, format!("encoding response: {e}"))
            }),
            Err(e) => failure(
                "merge",
                &e,
                ErrorCode::MergeFailed,
                format!("file merge fail: {e}"),
            ),
        }
    }

    async fn try_check_exists(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<ExistsResponse, StoreError> {
        let query = CheckExistsQuery::from_query(query)?;
        let staged = self.store.exists(&query.hash).await?;
        if staged.present {
            Ok(ExistsResponse::found(&staged.indices))
        } else {
            Ok(ExistsResponse::missing())
        }
    }

    async fn try_upload_chunk(&self, form: IncomingForm) -> Result<ChunkIndex, StoreError> {
        let fields = ChunkFields::from_form(&form.fields)?;
        let file = form
            .file
            .ok_or(StoreError::BadRequest(ProtocolError::MissingField(FIELD_DATA)))?;
        self.store
            .ingest(&fields.hash, fields.index, fields.total, file, fields.checksum)
            .await?;
        Ok(fields.index)
    }

    async fn try_finish(&self, query: &HashMap<String, String>) -> Result<(), StoreError> {
        let query = FinishQuery::from_query(query)?;
        self.reassembler
            .merge(&query.hash, &query.filename, query.checksum)
            .await?;
        Ok(())
    }
}

fn reply<T: Serialize>(message: &str, data: &T, on_error: ErrorCode) -> Envelope {
    Envelope::success(message, Some(data))
        .unwrap_or_else(|e| Envelope::error(on_error, format!("encoding response: {e}")))
}

fn failure(operation: &str, err: &StoreError, fallback: ErrorCode, message: String) -> Envelope {
    let code = err.code(fallback);
    warn!(operation, code = code.as_str(), error = %err, "upload request failed");
    Envelope::error(code, message)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove incoming temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const ID: &str = "0123456789abcdef0123456789abcdef";

    fn setup() -> (TempDir, UploadService) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::with_root(dir.path());
        config.ensure_layout().unwrap();
        (dir, UploadService::new(config))
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn chunk_form(svc: &UploadService, index: u64, total: u64, data: &[u8]) -> IncomingForm {
        let file = svc
            .config()
            .scratch_path()
            .join(format!("upload_{}", uuid::Uuid::new_v4()));
        std::fs::write(&file, data).unwrap();
        IncomingForm {
            fields: query(&[
                ("hash", ID),
                ("index", index.to_string().as_str()),
                ("total", total.to_string().as_str()),
            ]),
            file: Some(file),
        }
    }

    #[tokio::test]
    async fn exists_for_unknown_identity() {
        let (_dir, svc) = setup();
        let env = svc.check_exists(&query(&[("hash", ID)])).await;
        assert!(env.is_success());
        let data: ExistsResponse = env.parse_data().unwrap().unwrap();
        assert_eq!(data, ExistsResponse::missing());
    }

    #[tokio::test]
    async fn upload_then_exists_then_finish() {
        let (dir, svc) = setup();
        for (i, part) in [b"abc".as_slice(), b"def", b"g"].iter().enumerate() {
            let env = svc.upload_chunk(chunk_form(&svc, i as u64, 3, part)).await;
            assert!(env.is_success(), "{}", env.err_msg);
            assert_eq!(env.parse_data::<String>().unwrap().unwrap(), i.to_string());
        }

        let env = svc.check_exists(&query(&[("hash", ID)])).await;
        let data: ExistsResponse = env.parse_data().unwrap().unwrap();
        let (indices, rejected) = data.stored_indices();
        assert_eq!(indices.len(), 3);
        assert!(rejected.is_empty());

        let env = svc
            .finish(&query(&[("hash", ID), ("filename", "letters.txt")]))
            .await;
        assert!(env.is_success(), "{}", env.err_msg);
        assert_eq!(env.err_msg, "file merge success");
        assert!(env.data.is_none());
        assert_eq!(
            std::fs::read(dir.path().join("letters.txt")).unwrap(),
            b"abcdefg"
        );
    }

    #[tokio::test]
    async fn malformed_form_is_bad_request_and_file_removed() {
        let (_dir, svc) = setup();
        let mut form = chunk_form(&svc, 0, 1, b"x");
        form.fields.insert("index".into(), "007".into());
        let file = form.file.clone().unwrap();

        let env = svc.upload_chunk(form).await;
        assert_eq!(env.code(), Some(ErrorCode::BadRequest));
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn missing_data_field_is_bad_request() {
        let (_dir, svc) = setup();
        let mut form = chunk_form(&svc, 0, 1, b"x");
        form.file = None;
        let env = svc.upload_chunk(form).await;
        assert_eq!(env.code(), Some(ErrorCode::BadRequest));
        assert!(env.err_msg.contains("data"));
    }

    #[tokio::test]
    async fn checksum_mismatch_is_persist_failure() {
        let (_dir, svc) = setup();
        let mut form = chunk_form(&svc, 0, 1, b"payload");
        form.fields.insert("checksum".into(), "ab".repeat(32));
        let file = form.file.clone().unwrap();

        let env = svc.upload_chunk(form).await;
        assert_eq!(env.code(), Some(ErrorCode::PersistFailed));
        assert!(!file.exists());
        let staged = svc.store().exists(ID).await.unwrap();
        assert!(!staged.indices.contains(&ChunkIndex::new(0)));
    }

    #[tokio::test]
    async fn finish_with_gap_is_merge_failure() {
        let (dir, svc) = setup();
        svc.upload_chunk(chunk_form(&svc, 1, 2, b"b")).await;

        let env = svc
            .finish(&query(&[("hash", ID), ("filename", "out.bin")]))
            .await;
        assert_eq!(env.code(), Some(ErrorCode::MergeFailed));
        assert!(env.err_msg.starts_with("file merge fail: "));
        assert!(!dir.path().join("out.bin").exists());
    }

    #[tokio::test]
    async fn finish_with_traversal_is_bad_request() {
        let (_dir, svc) = setup();
        let env = svc
            .finish(&query(&[("hash", ID), ("filename", "../evil")]))
            .await;
        assert_eq!(env.code(), Some(ErrorCode::BadRequest));
    }

    #[tokio::test]
    async fn dispatch_routes_by_prefix() {
        let (_dir, svc) = setup();
        let request = IncomingRequest {
            query: query(&[("hash", ID)]),
            form: None,
        };
        let env = svc
            .dispatch("/upload/checkFileHashExist", request.clone())
            .await
            .unwrap();
        assert!(env.is_success());

        assert!(svc.dispatch("/other/checkFileHashExist", request.clone()).await.is_none());

        let env = svc.dispatch("/upload/uploadChunk", request).await.unwrap();
        assert_eq!(env.code(), Some(ErrorCode::BadRequest));
    }
}
