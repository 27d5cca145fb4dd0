//! Error types for order book history reconstruction.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.
//! Absence of data (a timestamp before the first snapshot, a time range with
//! no segments) is not an error and is reported through `Option` / empty
//! vectors instead.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Main error type for history operations.
#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    /// A segment file or directory could not be read.
    #[error("IO error on {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// A segment document is not valid JSON or does not match the wire format.
    #[error("Failed to decode segment: {0}")]
    Decode(String),

    /// A price or volume string is not a usable number.
    #[error("Invalid price level: price={price:?} volume={volume:?} ({reason})")]
    InvalidLevel {
        price: String,
        volume: String,
        reason: &'static str,
    },

    /// Offset outside `[0, max]` in `reconstruct_at_offset`.
    #[error("Offset {offset} out of range [0, {max}]")]
    OffsetOutOfRange { offset: usize, max: usize },

    /// A segment's diff timestamps decrease.
    #[error("Timestamps out of order at offset {offset}: {time} < {previous}")]
    UnorderedTimestamps {
        offset: usize,
        previous: i64,
        time: i64,
    },

    /// A query argument is unusable (e.g. zero sampling frequency).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A timestamp string could not be parsed.
    #[error("Invalid timestamp {0:?}: expected milliseconds, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS[.fff]")]
    InvalidTimestamp(String),

    /// A segment's content was rejected; carries the file it came from.
    #[error("{}: {source}", .path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<HistoryError>,
    },

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl HistoryError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        HistoryError::Generic(msg.into())
    }

    /// Wrap an IO error together with the path it happened on.
    pub fn io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        HistoryError::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Attach the segment file an error came from.
    ///
    /// Decode messages are prefixed with the path; content errors are
    /// wrapped in [`HistoryError::InFile`]. Errors that already name a path
    /// are returned unchanged.
    pub fn in_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match self {
            HistoryError::Decode(msg) => {
                HistoryError::Decode(format!("{}: {}", path.display(), msg))
            }
            err @ (HistoryError::InvalidLevel { .. }
            | HistoryError::UnorderedTimestamps { .. }
            | HistoryError::OffsetOutOfRange { .. }) => HistoryError::InFile {
                path: path.to_path_buf(),
                source: Box::new(err),
            },
            other => other,
        }
    }

    /// The innermost error, looking through [`HistoryError::InFile`].
    pub fn root_cause(&self) -> &HistoryError {
        match self {
            HistoryError::InFile { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        HistoryError::Generic(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Decode(err.to_string())
    }
}

impl From<String> for HistoryError {
    fn from(err: String) -> Self {
        HistoryError::Generic(err)
    }
}

impl From<&str> for HistoryError {
    fn from(err: &str) -> Self {
        HistoryError::Generic(err.to_string())
    }
}
