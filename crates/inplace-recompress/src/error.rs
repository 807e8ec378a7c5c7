//! Error types for the recompression engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for recompression operations.
pub type RecompressResult<T> = Result<T, RecompressError>;

/// Error variants for recompression operations.
#[derive(Debug, Error)]
pub enum RecompressError {
    /// An I/O operation on a specific path failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file changed length while it was being rewritten.
    #[error("Size mismatch on {path}: copied {actual} bytes instead of {expected}")]
    SizeMismatch {
        /// The file that changed.
        path: PathBuf,
        /// Size captured at scan time.
        expected: u64,
        /// Bytes actually moved.
        actual: u64,
    },

    /// Restoring the original timestamps failed.
    #[error("Failed to restore timestamps on {path}: {source}")]
    Timestamps {
        /// The file whose timestamps could not be set.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The resume ledger could not be opened or created.
    #[error("Resume ledger unavailable at {path}: {reason}")]
    LedgerUnavailable {
        /// Location of the ledger.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A ledger read or write failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    /// An ignore pattern failed to compile.
    #[error("Invalid ignore pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The root to process is missing or not a directory.
    #[error("{path} is not a directory")]
    NotADirectory {
        /// The rejected root.
        path: PathBuf,
    },

    /// The run configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RecompressError {
    /// Builds an [`RecompressError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecompressError::Io {
            path: path.into(),
            source,
        }
    }
}
