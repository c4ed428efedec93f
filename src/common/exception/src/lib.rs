//! Error types shared by every boundaries crate.

use std::io;

use thiserror::Error;

/// Errors raised while opening, indexing, querying or writing a dataset.
#[derive(Error, Debug)]
pub enum BoundariesError {
    /// The container header is absent, corrupt or belongs to another format.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The query bounding box is not finite or its bounds are inverted.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The remote resource does not honor partial content requests.
    #[error("Range requests are not supported by {0}")]
    RangeUnsupported(String),

    /// A read did not complete within the byte source deadline.
    #[error("Byte source timed out: {0}")]
    ByteSourceTimeout(String),

    /// Transient or permanent failure of the underlying file or transport.
    #[error("Byte source I/O error: {0}")]
    ByteSourceIo(String),

    /// The index promised more bytes than the feature record holds.
    #[error("Truncated feature: {0}")]
    TruncatedFeature(String),

    /// A feature does not match the schema or geometry type of its dataset.
    #[error("Invalid feature: {0}")]
    InvalidFeature(String),

    /// Packed index parameters or records are inconsistent.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Reader options could not be parsed or are out of range.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BoundariesError {
    /// True for failures of the byte source that a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ByteSourceTimeout(_) | Self::ByteSourceIo(_))
    }
}

impl From<io::Error> for BoundariesError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => Self::ByteSourceTimeout(err.to_string()),
            _ => Self::ByteSourceIo(err.to_string()),
        }
    }
}

/// Result type for boundaries operations.
pub type Result<T> = std::result::Result<T, BoundariesError>;
