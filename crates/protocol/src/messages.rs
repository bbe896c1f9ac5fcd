//! Request and response payloads.
//!
//! Requests travel as query strings or multipart fields, so each request
//! type converts to and from flat `name -> value` pairs. Responses travel
//! as JSON inside an [`Envelope`](crate::Envelope).

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::{FIELD_CHECKSUM, FIELD_FILENAME, FIELD_HASH, FIELD_INDEX, FIELD_TOTAL};
use crate::index::ChunkIndex;

/// Flat request fields, in the order they are sent.
pub type FieldList = Vec<(&'static str, String)>;

// ---------------------------------------------------------------------------
// Existence check
// ---------------------------------------------------------------------------

/// Query of the existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckExistsQuery {
    pub hash: String,
}

impl CheckExistsQuery {
    pub fn to_query(&self) -> FieldList {
        vec![(FIELD_HASH, self.hash.clone())]
    }

    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, ProtocolError> {
        Ok(Self {
            hash: required(query, FIELD_HASH)?.to_string(),
        })
    }
}

/// Payload of a successful existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistsResponse {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_list: Option<Vec<String>>,
}

impl ExistsResponse {
    /// No staging directory for the identity.
    pub fn missing() -> Self {
        Self {
            exists: false,
            chunk_list: None,
        }
    }

    /// Staging directory exists and holds `indices`.
    pub fn found<'a>(indices: impl IntoIterator<Item = &'a ChunkIndex>) -> Self {
        Self {
            exists: true,
            chunk_list: Some(indices.into_iter().map(ToString::to_string).collect()),
        }
    }

    /// Splits the reported names into canonical indices and rejected names.
    ///
    /// An identity that does not exist and one that exists with an empty
    /// listing both yield an empty set.
    pub fn stored_indices(&self) -> (BTreeSet<ChunkIndex>, Vec<String>) {
        let mut indices = BTreeSet::new();
        let mut rejected = Vec::new();
        if !self.exists {
            return (indices, rejected);
        }
        for name in self.chunk_list.iter().flatten() {
            match ChunkIndex::parse_canonical(name) {
                Some(index) => {
                    indices.insert(index);
                }
                None => rejected.push(name.clone()),
            }
        }
        (indices, rejected)
    }
}

// ---------------------------------------------------------------------------
// Chunk upload
// ---------------------------------------------------------------------------

/// Text fields of a chunk upload form. The chunk bytes travel in the
/// `data` file field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFields {
    pub hash: String,
    pub index: ChunkIndex,
    pub total: u64,
    /// SHA-256 hex digest of the chunk bytes.
    pub checksum: Option<String>,
}

impl ChunkFields {
    pub fn to_form(&self) -> FieldList {
        let mut fields = vec![
            (FIELD_HASH, self.hash.clone()),
            (FIELD_INDEX, self.index.to_string()),
            (FIELD_TOTAL, self.total.to_string()),
        ];
        if let Some(checksum) = &self.checksum {
            fields.push((FIELD_CHECKSUM, checksum.clone()));
        }
        fields
    }

    pub fn from_form(fields: &HashMap<String, String>) -> Result<Self, ProtocolError> {
        let hash = required(fields, FIELD_HASH)?.to_string();
        let index: ChunkIndex = required(fields, FIELD_INDEX)?.parse()?;
        let total_raw = required(fields, FIELD_TOTAL)?;
        let total = ChunkIndex::parse_canonical(total_raw)
            .map(ChunkIndex::get)
            .ok_or_else(|| ProtocolError::InvalidField {
                field: FIELD_TOTAL,
                value: total_raw.to_string(),
            })?;
        if index.get() >= total {
            return Err(ProtocolError::InvalidField {
                field: FIELD_INDEX,
                value: format!("{index} (total {total})"),
            });
        }
        Ok(Self {
            hash,
            index,
            total,
            checksum: optional(fields, FIELD_CHECKSUM),
        })
    }
}

// ---------------------------------------------------------------------------
// Finish
// ---------------------------------------------------------------------------

/// Query of the finish (merge) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishQuery {
    pub hash: String,
    pub filename: String,
    /// SHA-256 hex digest of the whole source file.
    pub checksum: Option<String>,
}

impl FinishQuery {
    pub fn to_query(&self) -> FieldList {
        let mut query = vec![
            (FIELD_HASH, self.hash.clone()),
            (FIELD_FILENAME, self.filename.clone()),
        ];
        if let Some(checksum) = &self.checksum {
            query.push((FIELD_CHECKSUM, checksum.clone()));
        }
        query
    }

    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, ProtocolError> {
        Ok(Self {
            hash: required(query, FIELD_HASH)?.to_string(),
            filename: required(query, FIELD_FILENAME)?.to_string(),
            checksum: optional(query, FIELD_CHECKSUM),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn required<'a>(
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ProtocolError> {
    match fields.get(name) {
        Some(v) if !v.is_empty() => Ok(v.as_str()),
        _ => Err(ProtocolError::MissingField(name)),
    }
}

fn optional(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    fields.get(name).filter(|v| !v.is_empty()).cloned()
}
