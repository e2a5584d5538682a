//! Common types for DIMSE operations

use serde::{Deserialize, Serialize};

/// DIMSE command types handled by the query/retrieve database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimseCommand {
    /// C-FIND command
    Find,
    /// C-MOVE command
    Move,
    /// C-GET command
    Get,
    /// C-STORE command
    Store,
}

/// DICOM query/retrieve levels
///
/// Ordering follows the hierarchy: `Patient < Study < Series < Image`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueryLevel {
    /// Patient level
    Patient,
    /// Study level
    Study,
    /// Series level
    Series,
    /// Image level
    Image,
}

impl QueryLevel {
    /// All levels from the top of the hierarchy down
    pub const ALL: [QueryLevel; 4] = [
        QueryLevel::Patient,
        QueryLevel::Study,
        QueryLevel::Series,
        QueryLevel::Image,
    ];

    /// Levels from `from` down to and including `to`
    ///
    /// Returns an empty iterator when `from` lies below `to`.
    pub fn range_inclusive(from: QueryLevel, to: QueryLevel) -> impl Iterator<Item = QueryLevel> {
        Self::ALL
            .into_iter()
            .filter(move |level| *level >= from && *level <= to)
    }

    /// The value carried by the QueryRetrieveLevel attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLevel::Patient => "PATIENT",
            QueryLevel::Study => "STUDY",
            QueryLevel::Series => "SERIES",
            QueryLevel::Image => "IMAGE",
        }
    }
}

impl std::fmt::Display for DimseCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimseCommand::Find => write!(f, "C-FIND"),
            DimseCommand::Move => write!(f, "C-MOVE"),
            DimseCommand::Get => write!(f, "C-GET"),
            DimseCommand::Store => write!(f, "C-STORE"),
        }
    }
}

impl std::fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueryLevel {
    type Err = crate::error::DimseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The attribute is CS, so trailing padding may survive decoding
        match s.trim().to_uppercase().as_str() {
            "PATIENT" => Ok(QueryLevel::Patient),
            "STUDY" => Ok(QueryLevel::Study),
            "SERIES" => Ok(QueryLevel::Series),
            "IMAGE" => Ok(QueryLevel::Image),
            _ => Err(crate::error::DimseError::invalid_level(s)),
        }
    }
}
