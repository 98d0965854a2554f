//! Error types for chatvault-core

use thiserror::Error;

/// Main error type for the chatvault-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Storage engine error, tagged with the operation that failed
    #[error("storage error in {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Store used before migrations were run
    #[error("storage is not ready: call migrate() before use")]
    StorageNotReady,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for a log document
    #[error("parse error in {format} log: {message}")]
    Parse { format: String, message: String },

    /// A log document whose overall shape is wrong (e.g. JSON export
    /// without a messages array)
    #[error("format error: {0}")]
    Format(String),

    /// An import/backup payload that does not match the expected shape
    #[error("invalid import format: {0}")]
    InvalidFormat(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entity lookup failure
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a storage engine error with the name of the failing operation.
    pub(crate) fn storage(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Error {
        move |source| Error::Storage { op, source }
    }
}

/// Result type alias for chatvault-core
pub type Result<T> = std::result::Result<T, Error>;
