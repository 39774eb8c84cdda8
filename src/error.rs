//! Error handling for the recorder
//!
//! This module defines the error taxonomy shared by the recording store, the
//! export engine and the worker boundary, plus a Result alias for use
//! throughout the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for recorder operations
#[derive(Error, Debug)]
pub enum ChordsError {
    /// The durable store could not be opened or used
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No session record exists for the requested key
    #[error("No data found for recording '{0}'")]
    NotFound(String),

    /// Export-all was requested against an empty store
    #[error("No data available to download")]
    NoData,

    /// Unrecognized protocol action or missing required field
    #[error("{0}")]
    InvalidRequest(String),

    /// A single archive entry could not be generated
    #[error("Failed to export '{entry}': {reason}")]
    PartialExportFailure { entry: String, reason: String },

    /// An error reported back across the worker boundary
    #[error("{message}")]
    Worker { kind: ErrorKind, message: String },

    /// Errors raised by the underlying SQLite store
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Errors raised while building a ZIP archive
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Errors raised while writing CSV tables
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ChordsError>,
    },
}

/// Wire-stable classification of a [`ChordsError`]
///
/// This is what crosses the worker boundary, so callers can tell a failed
/// request apart from "nothing recorded yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorKind {
    StoreUnavailable,
    NotFound,
    NoData,
    InvalidRequest,
    PartialExportFailure,
    #[default]
    Internal,
}

impl ChordsError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ChordsError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error, looking through any context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChordsError::StoreUnavailable(_) | ChordsError::Storage(_) => {
                ErrorKind::StoreUnavailable
            }
            ChordsError::NotFound(_) => ErrorKind::NotFound,
            ChordsError::NoData => ErrorKind::NoData,
            ChordsError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ChordsError::PartialExportFailure { .. } => ErrorKind::PartialExportFailure,
            ChordsError::Worker { kind, .. } => *kind,
            ChordsError::WithContext { source, .. } => source.kind(),
            _ => ErrorKind::Internal,
        }
    }

    /// Rebuild an error from a worker error response
    pub fn from_worker(kind: ErrorKind, message: impl Into<String>) -> Self {
        match kind {
            ErrorKind::NoData => ChordsError::NoData,
            kind => ChordsError::Worker {
                kind,
                message: message.into(),
            },
        }
    }

    /// Create a serialization error from a serde_json error
    pub fn from_json_error(err: serde_json::Error) -> Self {
        ChordsError::Serialization(err.to_string())
    }
}

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, ChordsError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ChordsError::Storage(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ChordsError::Storage(e).with_context(f()))
    }
}
