//! DIMSE Status Code Mapping
//!
//! The query/retrieve database reports every outcome as a [`QrStatus`]. This
//! module maps those outcomes onto the concrete DIMSE status codes defined in
//! DICOM PS3.4, which differ per command.
//!
//! # Status Code Mapping
//!
//! - `0x0000`: Success
//! - `0xFF00`: Pending (C-FIND, C-MOVE, C-GET)
//! - `0xFE00`: Cancel
//! - `0x0122`: Refused, SOP class not supported
//! - `0xA700`: Refused, out of resources (C-FIND, C-STORE)
//! - `0xA701`: Refused, out of resources, unable to calculate matches (C-MOVE, C-GET)
//! - `0xA900`: Identifier does not match SOP class
//! - `0xC001`: Unable to process (C-FIND)
//! - `0xC000`: Unable to process / cannot understand (C-MOVE, C-GET, C-STORE)
//!
//! # Usage
//!
//! ```
//! use dimse::{DimseCommand, DimseStatus, QrStatus};
//!
//! let status = QrStatus::OutOfResources.to_dimse(DimseCommand::Move);
//! assert_eq!(status, DimseStatus::Failure(0xA701));
//! ```

use crate::types::DimseCommand;

pub const STATUS_SUCCESS: u16 = 0x0000;
pub const STATUS_PENDING: u16 = 0xFF00;
pub const STATUS_CANCEL: u16 = 0xFE00;
pub const STATUS_SOP_CLASS_NOT_SUPPORTED: u16 = 0x0122;
pub const STATUS_OUT_OF_RESOURCES: u16 = 0xA700;
pub const STATUS_OUT_OF_RESOURCES_NUMBER_OF_MATCHES: u16 = 0xA701;
pub const STATUS_IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS: u16 = 0xA900;
pub const STATUS_FIND_UNABLE_TO_PROCESS: u16 = 0xC001;
pub const STATUS_UNABLE_TO_PROCESS: u16 = 0xC000;

/// DIMSE operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    /// Operation completed successfully
    Success,
    /// Operation is pending (more responses to follow)
    Pending,
    /// Operation cancelled by user
    Cancel,
    /// Operation failed or was refused
    Failure(u16), // DICOM status code
}

impl DimseStatus {
    /// The numeric status code carried on the wire
    pub fn code(&self) -> u16 {
        match self {
            DimseStatus::Success => STATUS_SUCCESS,
            DimseStatus::Pending => STATUS_PENDING,
            DimseStatus::Cancel => STATUS_CANCEL,
            DimseStatus::Failure(code) => *code,
        }
    }
}

/// Outcome of a query/retrieve database operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QrStatus {
    /// More responses follow
    Pending,
    /// The operation completed
    Success,
    /// Matching terminated due to cancel
    Cancel,
    /// Failed: identifier does not match SOP class
    IdentifierDoesNotMatchSopClass,
    /// Failed: unable to process
    UnableToProcess,
    /// Refused: SOP class not supported
    SopClassNotSupported,
    /// Refused: out of resources
    OutOfResources,
}

impl QrStatus {
    /// Map onto the DIMSE status code for a given command
    pub fn to_dimse(self, command: DimseCommand) -> DimseStatus {
        match self {
            QrStatus::Pending => DimseStatus::Pending,
            QrStatus::Success => DimseStatus::Success,
            QrStatus::Cancel => DimseStatus::Cancel,
            QrStatus::IdentifierDoesNotMatchSopClass => {
                DimseStatus::Failure(STATUS_IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS)
            }
            QrStatus::SopClassNotSupported => DimseStatus::Failure(STATUS_SOP_CLASS_NOT_SUPPORTED),
            QrStatus::UnableToProcess => match command {
                DimseCommand::Find => DimseStatus::Failure(STATUS_FIND_UNABLE_TO_PROCESS),
                _ => DimseStatus::Failure(STATUS_UNABLE_TO_PROCESS),
            },
            QrStatus::OutOfResources => match command {
                DimseCommand::Move | DimseCommand::Get => {
                    DimseStatus::Failure(STATUS_OUT_OF_RESOURCES_NUMBER_OF_MATCHES)
                }
                _ => DimseStatus::Failure(STATUS_OUT_OF_RESOURCES),
            },
        }
    }

    /// Whether further responses follow this one
    pub fn is_pending(&self) -> bool {
        matches!(self, QrStatus::Pending)
    }
}

impl std::fmt::Display for QrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            QrStatus::Pending => "Pending",
            QrStatus::Success => "Success",
            QrStatus::Cancel => "Cancel: matching terminated",
            QrStatus::IdentifierDoesNotMatchSopClass => {
                "Failed: identifier does not match SOP class"
            }
            QrStatus::UnableToProcess => "Failed: unable to process",
            QrStatus::SopClassNotSupported => "Refused: SOP class not supported",
            QrStatus::OutOfResources => "Refused: out of resources",
        };
        f.write_str(text)
    }
}
