//! Attribute catalog
//!
//! The static table of every attribute the index stores and can match on,
//! with its hierarchy level, key role, comparison class and the fixed width
//! of its field in an instance record.

use std::collections::HashMap;

use dicom_core::{Tag, VR};
use dimse::QueryLevel;
use once_cell::sync::Lazy;

/// Role of an attribute within its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Unique,
    Required,
    Optional,
}

/// Comparator used when matching the attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchClass {
    Date,
    Time,
    Uid,
    String,
    Other,
}

/// One indexed attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub tag: Tag,
    pub keyword: &'static str,
    pub vr: VR,
    pub level: QueryLevel,
    pub role: KeyRole,
    pub class: MatchClass,
    /// Width in bytes of the record field; longer values are truncated
    pub width: usize,
}

const fn entry(
    tag: (u16, u16),
    keyword: &'static str,
    vr: VR,
    level: QueryLevel,
    role: KeyRole,
    class: MatchClass,
    width: usize,
) -> CatalogEntry {
    CatalogEntry {
        tag: Tag(tag.0, tag.1),
        keyword,
        vr,
        level,
        role,
        class,
        width,
    }
}

use KeyRole::{Optional, Required, Unique};
use QueryLevel::{Image, Patient, Series, Study};

const DA: usize = 10;
const TM: usize = 16;
const UI: usize = 64;
const PN: usize = 64;
const LO: usize = 64;
const SH: usize = 16;
const CS: usize = 16;
const IS: usize = 12;
const DS: usize = 16;
const AS: usize = 4;

// Record field order follows this table
#[rustfmt::skip]
const ENTRIES: &[CatalogEntry] = &[
    // Patient level
    entry((0x0010, 0x0010), "PatientName", VR::PN, Patient, Required, MatchClass::String, PN),
    entry((0x0010, 0x0020), "PatientID", VR::LO, Patient, Unique, MatchClass::String, LO),
    entry((0x0010, 0x0030), "PatientBirthDate", VR::DA, Patient, Optional, MatchClass::Date, DA),
    entry((0x0010, 0x0032), "PatientBirthTime", VR::TM, Patient, Optional, MatchClass::Time, TM),
    entry((0x0010, 0x0040), "PatientSex", VR::CS, Patient, Optional, MatchClass::String, CS),
    entry((0x0010, 0x1000), "OtherPatientIDs", VR::LO, Patient, Optional, MatchClass::String, LO),
    entry((0x0010, 0x1001), "OtherPatientNames", VR::PN, Patient, Optional, MatchClass::String, PN),
    entry((0x0010, 0x2160), "EthnicGroup", VR::SH, Patient, Optional, MatchClass::String, SH),
    entry((0x0020, 0x1200), "NumberOfPatientRelatedStudies", VR::IS, Patient, Optional, MatchClass::Other, IS),
    entry((0x0020, 0x1202), "NumberOfPatientRelatedSeries", VR::IS, Patient, Optional, MatchClass::Other, IS),
    entry((0x0020, 0x1204), "NumberOfPatientRelatedInstances", VR::IS, Patient, Optional, MatchClass::Other, IS),
    // Study level
    entry((0x0008, 0x0020), "StudyDate", VR::DA, Study, Required, MatchClass::Date, DA),
    entry((0x0008, 0x0030), "StudyTime", VR::TM, Study, Required, MatchClass::Time, TM),
    entry((0x0008, 0x0050), "AccessionNumber", VR::SH, Study, Required, MatchClass::String, SH),
    entry((0x0008, 0x0090), "ReferringPhysicianName", VR::PN, Study, Optional, MatchClass::String, PN),
    entry((0x0008, 0x1030), "StudyDescription", VR::LO, Study, Optional, MatchClass::String, LO),
    entry((0x0008, 0x1060), "NameOfPhysiciansReadingStudy", VR::PN, Study, Optional, MatchClass::String, PN),
    entry((0x0008, 0x1080), "AdmittingDiagnosesDescription", VR::LO, Study, Optional, MatchClass::String, LO),
    entry((0x0010, 0x1010), "PatientAge", VR::AS, Study, Optional, MatchClass::String, AS),
    entry((0x0010, 0x1020), "PatientSize", VR::DS, Study, Optional, MatchClass::Other, DS),
    entry((0x0010, 0x1030), "PatientWeight", VR::DS, Study, Optional, MatchClass::Other, DS),
    entry((0x0010, 0x2180), "Occupation", VR::SH, Study, Optional, MatchClass::String, SH),
    entry((0x0020, 0x000D), "StudyInstanceUID", VR::UI, Study, Unique, MatchClass::Uid, UI),
    entry((0x0020, 0x0010), "StudyID", VR::SH, Study, Required, MatchClass::String, SH),
    entry((0x0020, 0x1070), "OtherStudyNumbers", VR::IS, Study, Optional, MatchClass::Other, IS),
    entry((0x0020, 0x1206), "NumberOfStudyRelatedSeries", VR::IS, Study, Optional, MatchClass::Other, IS),
    entry((0x0020, 0x1208), "NumberOfStudyRelatedInstances", VR::IS, Study, Optional, MatchClass::Other, IS),
    // Series level
    entry((0x0008, 0x0021), "SeriesDate", VR::DA, Series, Optional, MatchClass::Date, DA),
    entry((0x0008, 0x0031), "SeriesTime", VR::TM, Series, Optional, MatchClass::Time, TM),
    entry((0x0008, 0x0060), "Modality", VR::CS, Series, Optional, MatchClass::String, CS),
    entry((0x0008, 0x103E), "SeriesDescription", VR::LO, Series, Optional, MatchClass::String, LO),
    entry((0x0020, 0x000E), "SeriesInstanceUID", VR::UI, Series, Unique, MatchClass::Uid, UI),
    entry((0x0020, 0x0011), "SeriesNumber", VR::IS, Series, Required, MatchClass::Other, IS),
    // Image level
    entry((0x0008, 0x0018), "SOPInstanceUID", VR::UI, Image, Unique, MatchClass::Uid, UI),
    entry((0x0008, 0x0023), "ContentDate", VR::DA, Image, Optional, MatchClass::Date, DA),
    entry((0x0008, 0x0033), "ContentTime", VR::TM, Image, Optional, MatchClass::Time, TM),
    entry((0x0020, 0x0013), "InstanceNumber", VR::IS, Image, Required, MatchClass::Other, IS),
];

static CATALOG: Lazy<AttributeCatalog> = Lazy::new(AttributeCatalog::build);

/// Immutable catalog of indexed attributes, shared by every handle
#[derive(Debug)]
pub struct AttributeCatalog {
    entries: &'static [CatalogEntry],
    positions: HashMap<Tag, usize>,
    offsets: Vec<usize>,
    fields_size: usize,
}

impl AttributeCatalog {
    fn build() -> Self {
        let mut positions = HashMap::with_capacity(ENTRIES.len());
        let mut offsets = Vec::with_capacity(ENTRIES.len());
        let mut offset = 0;
        for (position, entry) in ENTRIES.iter().enumerate() {
            positions.insert(entry.tag, position);
            offsets.push(offset);
            offset += entry.width;
        }
        Self {
            entries: ENTRIES,
            positions,
            offsets,
            fields_size: offset,
        }
    }

    /// The process-wide catalog
    pub fn global() -> &'static AttributeCatalog {
        &CATALOG
    }

    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of an attribute in the record field order
    pub fn position(&self, tag: Tag) -> Option<usize> {
        self.positions.get(&tag).copied()
    }

    pub fn lookup(&self, tag: Tag) -> Option<&'static CatalogEntry> {
        self.position(tag).map(|position| &self.entries[position])
    }

    /// Byte offset of a field within the attribute block of a record
    pub fn field_offset(&self, position: usize) -> usize {
        self.offsets[position]
    }

    /// Total width of all attribute fields
    pub fn fields_size(&self) -> usize {
        self.fields_size
    }

    /// Position of the unique key for a level
    pub fn unique_key_position(&self, level: QueryLevel) -> usize {
        self.entries
            .iter()
            .position(|entry| entry.level == level && entry.role == KeyRole::Unique)
            .unwrap_or_else(|| unreachable!("every level has a unique key"))
    }

    pub fn unique_key(&self, level: QueryLevel) -> &'static CatalogEntry {
        &self.entries[self.unique_key_position(level)]
    }
}
