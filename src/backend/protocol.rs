//! Worker boundary message types
//!
//! Requests and responses keep the JSON shapes of the recording worker's wire
//! protocol:
//!
//! | Request | Success response |
//! |---|---|
//! | `{"action":"write","data":[...],"filename":"..."}` | `{"success":true}` |
//! | `{"action":"getAllData"}` | `{"allData":[{"id":1,"filename":"...","content":[...]}]}` |
//! | `{"action":"saveAsZip","canvasCount":N}` | `{"zipBlob":"<base64>"}` |
//! | `{"action":"saveDataByFilename","filename":"...","canvasCount":N}` | `{"blob":"<base64>"}` |
//!
//! Every failure is `{"error":"<message>","kind":"<ErrorKind>"}`; an
//! unrecognized action yields `{"error":"Invalid action",...}`.
//!
//! Over channels each message is wrapped in an [`Envelope`] whose id ties a
//! response to its request.

use crate::error::{ChordsError, ErrorKind, Result};
use crate::storage::IndexedRecord;
use crate::types::Frame;
use serde::{Deserialize, Serialize};

/// Correlation id assigned by the client to each request
pub type RequestId = u64;

/// A message body tagged with its correlation id
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub id: RequestId,
    pub body: T,
}

/// Actions the worker understands
pub const KNOWN_ACTIONS: &[&str] = &["write", "getAllData", "saveAsZip", "saveDataByFilename"];

/// Message returned for unrecognized actions
pub const INVALID_ACTION: &str = "Invalid action";

/// A request to the recording worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    /// Append frames to a session, creating it if needed
    #[serde(rename = "write")]
    Write { data: Vec<Frame>, filename: String },

    /// Read every session in the store
    #[serde(rename = "getAllData")]
    GetAllData,

    /// Export every session into one ZIP archive
    #[serde(rename = "saveAsZip", rename_all = "camelCase")]
    SaveAsZip { canvas_count: usize },

    /// Export one session as CSV
    #[serde(rename = "saveDataByFilename", rename_all = "camelCase")]
    SaveDataByFilename {
        filename: String,
        canvas_count: usize,
    },
}

impl Request {
    /// Wire name of this request's action
    pub fn action(&self) -> &'static str {
        match self {
            Request::Write { .. } => "write",
            Request::GetAllData => "getAllData",
            Request::SaveAsZip { .. } => "saveAsZip",
            Request::SaveDataByFilename { .. } => "saveDataByFilename",
        }
    }

    /// Decode a request from its JSON text
    ///
    /// Unknown or missing actions fail with `InvalidRequest("Invalid action")`;
    /// known actions with missing or mistyped fields fail with an
    /// `InvalidRequest` naming the action.
    pub fn decode(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ChordsError::InvalidRequest(format!("Malformed request: {}", e)))?;

        let action = value
            .get("action")
            .and_then(|a| a.as_str())
            .filter(|a| KNOWN_ACTIONS.contains(a))
            .ok_or_else(|| ChordsError::InvalidRequest(INVALID_ACTION.to_string()))?
            .to_string();

        serde_json::from_value(value).map_err(|e| {
            ChordsError::InvalidRequest(format!("Malformed '{}' request: {}", action, e))
        })
    }

    /// Encode as JSON text
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ChordsError::from_json_error)
    }
}

/// What reaches the worker: an already-typed request or raw JSON text
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Typed(Request),
    Wire(String),
}

/// A response from the recording worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Outcome of a write
    Written { success: bool },

    /// Every stored session
    AllData {
        #[serde(rename = "allData")]
        all_data: Vec<IndexedRecord>,
    },

    /// ZIP archive of all sessions
    Archive {
        #[serde(rename = "zipBlob", with = "blob")]
        zip_blob: Vec<u8>,
    },

    /// CSV export of one session
    Export {
        #[serde(with = "blob")]
        blob: Vec<u8>,
    },

    /// The request failed; peers that send no `kind` decode as `Internal`
    Error {
        error: String,
        #[serde(default)]
        kind: ErrorKind,
    },
}

impl Response {
    /// Build an error response from an error
    pub fn from_error(err: &ChordsError) -> Self {
        Response::Error {
            error: err.to_string(),
            kind: err.kind(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// Convert an error response back into an error
    pub fn into_result(self) -> Result<Response> {
        match self {
            Response::Error { error, kind } => Err(ChordsError::from_worker(kind, error)),
            other => Ok(other),
        }
    }

    /// Decode a response from its JSON text
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ChordsError::from_json_error)
    }

    /// Encode as JSON text
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ChordsError::from_json_error)
    }
}

/// Binary payloads travel as base64 strings in JSON
mod blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
