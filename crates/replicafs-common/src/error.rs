//! Error types for replicafs
//!
//! This module defines the error kinds surfaced by the synchronous
//! operations (store, resolve, mark-deleted) and by lock acquisition.

use crate::types::FileIdError;
use thiserror::Error;

/// Common result type for replicafs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for replicafs
#[derive(Debug, Error)]
pub enum Error {
    // Placement errors
    #[error("there is no available host")]
    NoHostAvailable,

    // Transport errors
    #[error("cannot transfer to {url}: {detail}")]
    TransferFailed { url: String, detail: String },

    // Metadata errors
    /// The object may already exist on its host when this is returned.
    #[error("cannot add {file_id} to the index: {detail}")]
    IndexWriteFailed { file_id: String, detail: String },

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("file not found: {0}")]
    NotFound(String),

    // Batch errors
    #[error("lock already held: {0}")]
    AlreadyLocked(String),

    // Input errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid file identifier: {0}")]
    InvalidFileId(#[from] FileIdError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a metadata error
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the arguments supplied by the caller were rejected
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidFileId(_))
    }
}
