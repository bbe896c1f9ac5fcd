//! Chunk transfer with a bounded number of requests in flight.

use bigfile_protocol::constants::FIELD_DATA;
use bigfile_protocol::{ChunkFields, ChunkIndex, Route};
use bigfile_transfer::{Chunk, ChunkReader, TransferError};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ReplyError, UploadError};
use crate::session::UploadSession;
use crate::transport::{OutgoingForm, Transport, decode_reply};

/// Sends the chunks of a session that the server does not hold yet.
pub struct ChunkTransporter<'a> {
    transport: &'a dyn Transport,
    prefix: &'a str,
    concurrency: usize,
    verify_checksum: bool,
    cancel: CancellationToken,
}

impl<'a> ChunkTransporter<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        prefix: &'a str,
        concurrency: usize,
        verify_checksum: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            prefix,
            concurrency: concurrency.max(1),
            verify_checksum,
            cancel,
        }
    }

    /// Uploads every missing chunk in ascending index order, keeping at most
    /// `concurrency` requests in flight.
    ///
    /// `on_progress` receives the 1-based count of chunks completed by this
    /// call, in completion order, so the counts always rise by one. The
    /// first failure cancels the remaining transfers and is returned.
    /// Returns the number of chunks sent.
    pub async fn upload_missing(
        &self,
        session: &UploadSession,
        mut on_progress: impl FnMut(usize),
    ) -> Result<usize, UploadError> {
        let missing = session.missing();
        if missing.is_empty() {
            debug!(identity = %session.identity, "all chunks already stored");
            return Ok(0);
        }

        let path = Route::UploadChunk.path(self.prefix);
        // Cancelling the child on failure stops this session only.
        let token = self.cancel.child_token();

        let mut results = stream::iter(missing)
            .map(|index| self.send_chunk(session, &path, index, &token))
            .buffer_unordered(self.concurrency);

        let mut completed = 0usize;
        while let Some(result) = results.next().await {
            match result {
                Ok(index) => {
                    completed += 1;
                    debug!(identity = %session.identity, %index, completed, "chunk uploaded");
                    on_progress(completed);
                }
                Err(e) => {
                    token.cancel();
                    warn!(identity = %session.identity, error = %e, "chunk transfer aborted");
                    return Err(e);
                }
            }
        }
        Ok(completed)
    }

    async fn send_chunk(
        &self,
        session: &UploadSession,
        path: &str,
        index: ChunkIndex,
        token: &CancellationToken,
    ) -> Result<ChunkIndex, UploadError> {
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let source = session.path.clone();
        let plan = session.plan;
        let chunk = tokio::task::spawn_blocking(move || -> Result<Chunk, TransferError> {
            ChunkReader::open(&source, plan)?.read_chunk(index)
        })
        .await??;

        let fields = ChunkFields {
            hash: session.identity.clone(),
            index,
            total: plan.chunk_count(),
            checksum: self.verify_checksum.then(|| chunk.checksum.clone()),
        };
        let form = OutgoingForm {
            fields: fields.to_form(),
            file_field: FIELD_DATA,
            file_name: index.to_string(),
            data: chunk.data,
        };

        let reply = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(UploadError::Cancelled),
            reply = self.transport.post_form(path, form) => reply,
        };

        let acked: Option<String> = reply
            .map_err(ReplyError::from)
            .and_then(decode_reply::<String>)
            .map_err(|e| UploadError::chunk(index, e))?;

        match acked {
            Some(ack) if ack == index.to_string() => Ok(index),
            other => Err(UploadError::Protocol(format!(
                "chunk {index} acknowledged as {other:?}"
            ))),
        }
    }
}
