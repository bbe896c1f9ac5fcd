//! Client side of resumable chunked uploads.
//!
//! An [`Uploader`] fingerprints a file, asks the server which chunks it
//! already holds, sends the rest through a [`Transport`] and asks the server
//! to merge them. Progress is reported through lifecycle events.

pub mod config;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod orchestrator;
pub mod session;
pub mod transport;
pub mod transporter;

#[cfg(test)]
mod mock;

pub use config::UploaderConfig;
pub use error::{ReplyError, TransportError, UploadError};
pub use events::{EventBus, EventKind, Listener, ListenerId, UploadEvent};
pub use negotiator::ResumeNegotiator;
pub use orchestrator::{UploadReport, Uploader};
pub use session::{SessionState, UploadSession};
pub use transport::{OutgoingForm, Reply, Transport, TransportFuture, decode_reply};
pub use transporter::ChunkTransporter;
