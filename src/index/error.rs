//! Error types for index database operations

use std::path::PathBuf;

use dimse::QrStatus;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias for index database operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Error types that can occur during index database operations
///
/// Every variant maps onto a [`QrStatus`] through [`DbError::status`], so the
/// caller decides how the failure surfaces on the wire.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to open index file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SOP class not supported: {0}")]
    UnsupportedSopClass(String),

    #[error("Identifier does not match SOP class: {0}")]
    InvalidIdentifier(String),

    #[error("Out of resources: {0}")]
    OutOfResources(String),

    #[error("Failed to lock index file: {0}")]
    Lock(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt index record: {0}")]
    Corrupt(String),

    #[error("Index file {path} holds {found} study descriptors, configured for {expected}")]
    LayoutMismatch {
        path: PathBuf,
        found: usize,
        expected: usize,
    },

    #[error("No record at slot {0}")]
    NotFound(usize),

    #[error("DICOM object error: {0}")]
    DicomObject(String),

    #[error("Storage area error: {0}")]
    Storage(#[from] StorageError),

    #[error("No {0} request in progress")]
    NoActiveRequest(&'static str),

    #[error("Another request is already in progress on this handle")]
    RequestInProgress,
}

impl DbError {
    /// Create a new identifier validation error
    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::InvalidIdentifier(msg.into())
    }

    /// Create a new out of resources error
    pub fn out_of_resources(msg: impl Into<String>) -> Self {
        Self::OutOfResources(msg.into())
    }

    /// Create a new corrupt record error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// The query/retrieve status reported for this error
    pub fn status(&self) -> QrStatus {
        match self {
            DbError::InvalidIdentifier(_) => QrStatus::IdentifierDoesNotMatchSopClass,
            DbError::UnsupportedSopClass(_) => QrStatus::SopClassNotSupported,
            DbError::OutOfResources(_)
            | DbError::Lock(_)
            | DbError::Storage(StorageError::NameExhausted(_)) => QrStatus::OutOfResources,
            DbError::Open { .. }
            | DbError::Io(_)
            | DbError::Corrupt(_)
            | DbError::LayoutMismatch { .. }
            | DbError::NotFound(_)
            | DbError::DicomObject(_)
            | DbError::Storage(_)
            | DbError::NoActiveRequest(_)
            | DbError::RequestInProgress => QrStatus::UnableToProcess,
        }
    }

    /// Whether the error reflects a caller calling operations out of order
    pub fn is_sequencing_error(&self) -> bool {
        matches!(self, DbError::NoActiveRequest(_) | DbError::RequestInProgress)
    }
}
