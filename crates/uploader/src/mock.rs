//! Scriptable in-memory transport for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bigfile_protocol::messages::FieldList;
use bigfile_protocol::{Envelope, ErrorCode, ExistsResponse};

use crate::error::TransportError;
use crate::transport::{OutgoingForm, Reply, Transport, TransportFuture};

#[derive(Debug, Clone)]
pub struct SentChunk {
    pub path: String,
    pub fields: HashMap<String, String>,
    pub data: Vec<u8>,
}

impl SentChunk {
    pub fn index(&self) -> u64 {
        self.fields["index"].parse().unwrap()
    }
}

pub struct MockTransport {
    exists: Envelope,
    finish: Envelope,
    fail_chunks: HashSet<u64>,
    delays: HashMap<u64, Duration>,
    gets: Mutex<Vec<(String, FieldList)>>,
    posts: Mutex<Vec<SentChunk>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            exists: Envelope::success("success", Some(&ExistsResponse::missing())).unwrap(),
            finish: Envelope::success::<()>("file merge success", None).unwrap(),
            fail_chunks: HashSet::new(),
            delays: HashMap::new(),
            gets: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_exists(self, response: ExistsResponse) -> Self {
        self.with_exists_envelope(Envelope::success("success", Some(&response)).unwrap())
    }

    pub fn with_exists_envelope(mut self, envelope: Envelope) -> Self {
        self.exists = envelope;
        self
    }

    pub fn with_finish_envelope(mut self, envelope: Envelope) -> Self {
        self.finish = envelope;
        self
    }

    /// Chunk `index` is answered with a persist failure.
    pub fn failing_chunk(mut self, index: u64) -> Self {
        self.fail_chunks.insert(index);
        self
    }

    /// Chunk `index` takes `delay` to be acknowledged.
    pub fn delay_chunk(mut self, index: u64, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    pub fn gets(&self) -> Vec<(String, FieldList)> {
        self.gets.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<SentChunk> {
        self.posts.lock().unwrap().clone()
    }

    pub fn sent_indices(&self) -> Vec<u64> {
        self.posts().iter().map(SentChunk::index).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn get<'a>(&'a self, path: &'a str, query: FieldList) -> TransportFuture<'a> {
        self.gets.lock().unwrap().push((path.to_string(), query));
        Box::pin(async move {
            let envelope = if path.ends_with("/checkFileHashExist") {
                &self.exists
            } else if path.ends_with("/uploadFinish") {
                &self.finish
            } else {
                return Ok(Reply {
                    status: 404,
                    status_text: "Not Found".into(),
                    body: Vec::new(),
                });
            };
            let body = envelope
                .to_vec()
                .map_err(|e| TransportError(e.to_string()))?;
            Ok(Reply::ok(body))
        })
    }

    fn post_form<'a>(&'a self, path: &'a str, form: OutgoingForm) -> TransportFuture<'a> {
        let chunk = SentChunk {
            path: path.to_string(),
            fields: form
                .fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            data: form.data,
        };
        let index = chunk.index();
        self.posts.lock().unwrap().push(chunk);

        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&index) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let envelope = if self.fail_chunks.contains(&index) {
                Envelope::error(ErrorCode::PersistFailed, "disk full")
            } else {
                Envelope::success("upload success", Some(&index.to_string())).unwrap()
            };
            Ok(Reply::ok(envelope.to_vec().unwrap()))
        })
    }
}
