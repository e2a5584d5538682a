//! Error types for DIMSE vocabulary parsing

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur while interpreting DIMSE values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimseError {
    #[error("Invalid query level: {0}")]
    InvalidQueryLevel(String),

    #[error("Unknown SOP class: {0}")]
    UnknownSopClass(String),
}

impl DimseError {
    /// Create a new invalid query level error
    pub fn invalid_level(value: impl Into<String>) -> Self {
        Self::InvalidQueryLevel(value.into())
    }

    /// Create a new unknown SOP class error
    pub fn unknown_sop_class(uid: impl Into<String>) -> Self {
        Self::UnknownSopClass(uid.into())
    }
}
