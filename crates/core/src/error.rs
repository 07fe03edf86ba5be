//! Error types for mugimap

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for mugimap core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("field table error: {0}")]
    FieldTable(#[from] csv::Error),

    #[error("field table is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("invalid observation date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("invalid ledger: {0}")]
    InvalidLedger(String),

    #[error("invalid boundary for field {field}: {reason}")]
    InvalidBoundary { field: String, reason: String },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Band size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("imagery source error: {0}")]
    Source(String),
}

impl Error {
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json_at(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for mugimap core operations
pub type Result<T> = std::result::Result<T, Error>;
