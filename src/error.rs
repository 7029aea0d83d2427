//! Error types for annotrack

use thiserror::Error;

/// Result type alias for annotrack operations
pub type Result<T> = std::result::Result<T, AnnotrackError>;

/// Error types that can occur in annotrack
#[derive(Debug, Error)]
pub enum AnnotrackError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Compression or index construction did not produce the expected artifact.
    ///
    /// Raised at preparation time when BGZF compression or index building
    /// fails or leaves no artifact behind (permission denied, unsorted
    /// input, disk full). Fatal to the annotation set being constructed.
    #[error("failed to prepare {path}: {reason}")]
    IndexBuild {
        /// Path being prepared
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The annotation file does not satisfy the required record shape.
    #[error("invalid annotation schema: {msg}")]
    Schema {
        /// Description of the schema violation
        msg: String,
    },

    /// BGZF block compression/decompression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Invalid input data (malformed index, unknown reference, bad field)
    #[error("invalid input: {msg}")]
    InvalidInput {
        /// Error message
        msg: String,
    },

    /// Invalid coordinate range
    #[error("invalid range: {0}")]
    InvalidRange(String),
}
