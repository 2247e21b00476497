use std::path::PathBuf;

use thiserror::Error;

/// Main error type for spotify-history
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Failed to read {}: {reason}", .path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("Failed to write partition {year}: {reason}")]
    PartitionWrite { year: i32, reason: String },

    #[error("{source_name} lookup failed: {reason}")]
    Lookup {
        source_name: &'static str,
        reason: String,
    },

    #[error("Checkpoint flush for partition {year} failed: {reason}")]
    CheckpointFlush { year: i32, reason: String },

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

impl HistoryError {
    /// Create a malformed record error for the element at `index`
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            index,
            reason: reason.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a partition write error
    pub fn partition_write(year: i32, reason: impl ToString) -> Self {
        Self::PartitionWrite {
            year,
            reason: reason.to_string(),
        }
    }

    /// Create a lookup error attributed to a catalog source
    pub fn lookup(source_name: &'static str, reason: impl ToString) -> Self {
        Self::Lookup {
            source_name,
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error from a message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Whether the run that produced this error must stop.
    ///
    /// Only failures at the partition durability boundary are fatal; everything
    /// below file granularity is absorbed by the coordinators.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CheckpointFlush { .. })
    }
}
