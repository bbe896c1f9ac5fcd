use std::collections::BTreeSet;

use bigfile_protocol::{CheckExistsQuery, ChunkIndex, ExistsResponse, Route};
use tracing::{debug, warn};

use crate::error::{ReplyError, UploadError};
use crate::transport::{Transport, decode_reply};

/// Asks the server which chunks of an identity it already holds.
pub struct ResumeNegotiator<'a> {
    transport: &'a dyn Transport,
    prefix: &'a str,
}

impl<'a> ResumeNegotiator<'a> {
    pub fn new(transport: &'a dyn Transport, prefix: &'a str) -> Self {
        Self { transport, prefix }
    }

    /// Returns the stored indices; empty for an unknown identity.
    ///
    /// Names that are not canonical indices can never match a planned
    /// chunk, so they are logged and dropped.
    pub async fn negotiate(&self, identity: &str) -> Result<BTreeSet<ChunkIndex>, UploadError> {
        let path = Route::CheckExists.path(self.prefix);
        let query = CheckExistsQuery {
            hash: identity.to_string(),
        };

        let response: ExistsResponse = self
            .transport
            .get(&path, query.to_query())
            .await
            .map_err(ReplyError::from)
            .and_then(decode_reply::<ExistsResponse>)
            .map_err(UploadError::negotiation)?
            .ok_or_else(|| UploadError::Protocol("existence check returned no data".into()))?;

        let (present, rejected) = response.stored_indices();
        if !rejected.is_empty() {
            warn!(identity, ?rejected, "ignoring non-index names in chunk list");
        }
        debug!(identity, exists = response.exists, present = present.len(), "resume check done");
        Ok(present)
    }
}
