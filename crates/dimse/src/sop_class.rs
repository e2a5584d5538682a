//! SOP Class UIDs understood by the query/retrieve database
//!
//! Query/retrieve SOP classes select an [`InformationModel`] together with the
//! operation (find, move or get). Storage SOP classes map onto a short
//! modality prefix used when naming stored object files.

use serde::{Deserialize, Serialize};

use crate::error::{DimseError, Result};
use crate::types::QueryLevel;

pub const PATIENT_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.1.1";
pub const PATIENT_ROOT_MOVE: &str = "1.2.840.10008.5.1.4.1.2.1.2";
pub const PATIENT_ROOT_GET: &str = "1.2.840.10008.5.1.4.1.2.1.3";
pub const STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
pub const STUDY_ROOT_MOVE: &str = "1.2.840.10008.5.1.4.1.2.2.2";
pub const STUDY_ROOT_GET: &str = "1.2.840.10008.5.1.4.1.2.2.3";
pub const PATIENT_STUDY_ONLY_FIND: &str = "1.2.840.10008.5.1.4.1.2.3.1";
pub const PATIENT_STUDY_ONLY_MOVE: &str = "1.2.840.10008.5.1.4.1.2.3.2";
pub const PATIENT_STUDY_ONLY_GET: &str = "1.2.840.10008.5.1.4.1.2.3.3";

/// Prefix used for objects whose SOP class has no known modality
pub const UNKNOWN_MODALITY_PREFIX: &str = "XX";

/// Query/retrieve information models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InformationModel {
    /// Patient Root: PATIENT, STUDY, SERIES, IMAGE
    PatientRoot,
    /// Study Root: STUDY, SERIES, IMAGE
    StudyRoot,
    /// Patient/Study Only: PATIENT, STUDY
    PatientStudyOnly,
}

/// Operation selected by a query/retrieve SOP class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelOperation {
    Find,
    Move,
    Get,
}

const QUERY_RETRIEVE_CLASSES: &[(&str, InformationModel, ModelOperation)] = &[
    (PATIENT_ROOT_FIND, InformationModel::PatientRoot, ModelOperation::Find),
    (PATIENT_ROOT_MOVE, InformationModel::PatientRoot, ModelOperation::Move),
    (PATIENT_ROOT_GET, InformationModel::PatientRoot, ModelOperation::Get),
    (STUDY_ROOT_FIND, InformationModel::StudyRoot, ModelOperation::Find),
    (STUDY_ROOT_MOVE, InformationModel::StudyRoot, ModelOperation::Move),
    (STUDY_ROOT_GET, InformationModel::StudyRoot, ModelOperation::Get),
    (PATIENT_STUDY_ONLY_FIND, InformationModel::PatientStudyOnly, ModelOperation::Find),
    (PATIENT_STUDY_ONLY_MOVE, InformationModel::PatientStudyOnly, ModelOperation::Move),
    (PATIENT_STUDY_ONLY_GET, InformationModel::PatientStudyOnly, ModelOperation::Get),
];

impl InformationModel {
    /// Resolve a query/retrieve SOP class UID
    pub fn from_sop_class(uid: &str) -> Result<(InformationModel, ModelOperation)> {
        let uid = trim_uid(uid);
        QUERY_RETRIEVE_CLASSES
            .iter()
            .find(|(candidate, _, _)| *candidate == uid)
            .map(|(_, model, op)| (*model, *op))
            .ok_or_else(|| DimseError::unknown_sop_class(uid))
    }

    /// The SOP class UID for this model and operation
    pub fn sop_class_uid(&self, op: ModelOperation) -> &'static str {
        QUERY_RETRIEVE_CLASSES
            .iter()
            .find(|(_, model, candidate)| model == self && *candidate == op)
            .map(|(uid, _, _)| *uid)
            .unwrap_or(PATIENT_ROOT_FIND)
    }

    /// Topmost level of the model hierarchy
    pub fn root_level(&self) -> QueryLevel {
        match self {
            InformationModel::StudyRoot => QueryLevel::Study,
            _ => QueryLevel::Patient,
        }
    }

    /// Lowest level of the model hierarchy
    pub fn deepest_level(&self) -> QueryLevel {
        match self {
            InformationModel::PatientStudyOnly => QueryLevel::Study,
            _ => QueryLevel::Image,
        }
    }

    /// Whether `level` exists in this model
    pub fn supports_level(&self, level: QueryLevel) -> bool {
        level >= self.root_level() && level <= self.deepest_level()
    }
}

impl std::fmt::Display for InformationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InformationModel::PatientRoot => write!(f, "Patient Root"),
            InformationModel::StudyRoot => write!(f, "Study Root"),
            InformationModel::PatientStudyOnly => write!(f, "Patient/Study Only"),
        }
    }
}

const MODALITY_PREFIXES: &[(&str, &str)] = &[
    ("1.2.840.10008.5.1.4.1.1.1", "CR"),
    ("1.2.840.10008.5.1.4.1.1.1.1", "DX"),
    ("1.2.840.10008.5.1.4.1.1.1.1.1", "DX"),
    ("1.2.840.10008.5.1.4.1.1.1.2", "MG"),
    ("1.2.840.10008.5.1.4.1.1.1.2.1", "MG"),
    ("1.2.840.10008.5.1.4.1.1.2", "CT"),
    ("1.2.840.10008.5.1.4.1.1.2.1", "CT"),
    ("1.2.840.10008.5.1.4.1.1.3.1", "US"),
    ("1.2.840.10008.5.1.4.1.1.4", "MR"),
    ("1.2.840.10008.5.1.4.1.1.4.1", "MR"),
    ("1.2.840.10008.5.1.4.1.1.6.1", "US"),
    ("1.2.840.10008.5.1.4.1.1.7", "SC"),
    ("1.2.840.10008.5.1.4.1.1.11.1", "PS"),
    ("1.2.840.10008.5.1.4.1.1.12.1", "XA"),
    ("1.2.840.10008.5.1.4.1.1.12.2", "RF"),
    ("1.2.840.10008.5.1.4.1.1.20", "NM"),
    ("1.2.840.10008.5.1.4.1.1.88.11", "SR"),
    ("1.2.840.10008.5.1.4.1.1.88.22", "SR"),
    ("1.2.840.10008.5.1.4.1.1.88.33", "SR"),
    ("1.2.840.10008.5.1.4.1.1.88.59", "KO"),
    ("1.2.840.10008.5.1.4.1.1.104.1", "DOC"),
    ("1.2.840.10008.5.1.4.1.1.128", "PT"),
    ("1.2.840.10008.5.1.4.1.1.481.1", "RI"),
    ("1.2.840.10008.5.1.4.1.1.481.2", "RD"),
    ("1.2.840.10008.5.1.4.1.1.481.3", "RS"),
    ("1.2.840.10008.5.1.4.1.1.481.5", "RP"),
];

/// Short modality prefix for a storage SOP class, if known
pub fn modality_prefix(sop_class_uid: &str) -> Option<&'static str> {
    let uid = trim_uid(sop_class_uid);
    MODALITY_PREFIXES
        .iter()
        .find(|(candidate, _)| *candidate == uid)
        .map(|(_, prefix)| *prefix)
}

/// UI values are padded with a trailing NUL to even length
fn trim_uid(uid: &str) -> &str {
    uid.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}
