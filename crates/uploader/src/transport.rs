//! Transport seam.
//!
//! The uploader never speaks HTTP itself. An application implements
//! [`Transport`] on top of its HTTP client; tests implement it with mocks
//! or a loopback into the upload service.

use std::future::Future;
use std::pin::Pin;

use bigfile_protocol::Envelope;
use bigfile_protocol::messages::FieldList;
use serde::de::DeserializeOwned;

use crate::error::{ReplyError, TransportError};

/// A boxed future returned by transport methods.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Reply, TransportError>> + Send + 'a>>;

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
}

impl Reply {
    /// A `200 OK` reply carrying `body`.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            status_text: "OK".into(),
            body,
        }
    }
}

/// A multipart form: text fields plus one file field.
#[derive(Debug, Clone)]
pub struct OutgoingForm {
    pub fields: FieldList,
    pub file_field: &'static str,
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Sends requests to the upload server.
pub trait Transport: Send + Sync {
    /// Sends a GET request with the given query parameters.
    fn get<'a>(&'a self, path: &'a str, query: FieldList) -> TransportFuture<'a>;

    /// Sends a multipart POST request.
    fn post_form<'a>(&'a self, path: &'a str, form: OutgoingForm) -> TransportFuture<'a>;
}

/// Unwraps the envelope of a reply and decodes its payload.
///
/// A non-200 status, an unparsable body and a non-success code are all
/// errors; a success envelope without `data` yields `None`.
pub fn decode_reply<T: DeserializeOwned>(reply: Reply) -> Result<Option<T>, ReplyError> {
    if reply.status != 200 {
        return Err(ReplyError::Status {
            status: reply.status,
            text: reply.status_text,
        });
    }
    let envelope = Envelope::from_slice(&reply.body)?;
    if !envelope.is_success() {
        return Err(ReplyError::Rejected {
            code: envelope.err_code,
            message: envelope.err_msg,
        });
    }
    Ok(envelope.parse_data()?)
}
