//! DIMSE (DICOM Message Service Element) vocabulary
//!
//! This crate carries the protocol-level terms the query/retrieve database
//! speaks with its callers: status codes, query/retrieve levels and the
//! information models selected by SOP Class UID.
//!
//! # Features
//! - DIMSE status codes and per-command mapping of engine outcomes
//! - Query/retrieve levels with hierarchy ordering
//! - Patient-Root, Study-Root and Patient/Study-Only models for C-FIND, C-MOVE and C-GET
//! - SOP Class to modality prefix lookup used when naming stored objects

pub mod error;
pub mod sop_class;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use error::{DimseError, Result};
pub use sop_class::{InformationModel, ModelOperation};
pub use status::{DimseStatus, QrStatus};
pub use types::{DimseCommand, QueryLevel};
