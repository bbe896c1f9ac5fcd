use serde::{Deserialize, Serialize};

use crate::constants::ErrorCode;

/// Envelope for every response.
///
/// The `data` field uses `serde_json::value::RawValue` to defer
/// deserialization until the caller knows which payload to expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub err_code: String,
    pub err_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl Envelope {
    /// Creates a success envelope with an optional payload.
    pub fn success<T: Serialize>(
        message: impl Into<String>,
        data: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match data {
            Some(d) => {
                let json = serde_json::to_string(d)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            err_code: ErrorCode::Success.as_str().to_string(),
            err_msg: message.into(),
            data: raw,
        })
    }

    /// Creates an error envelope.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            err_code: code.as_str().to_string(),
            err_msg: message.into(),
            data: None,
        }
    }

    /// Returns `true` if the envelope carries the success code.
    pub fn is_success(&self) -> bool {
        self.err_code == ErrorCode::Success.as_str()
    }

    /// Returns the parsed status code, if it is one this crate knows.
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(&self.err_code)
    }

    /// Deserializes the payload into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Parses an envelope from a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Serializes the envelope into a response body.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
