//! Request identifiers: parsing, key placement checks and record matching
//!
//! A [`ParsedQuery`] is built from the identifier of a C-FIND, C-MOVE or C-GET
//! request. Only catalog attributes take part in matching; anything else in
//! the identifier is ignored.

use dicom_core::header::DataElement;
use dicom_core::value::PrimitiveValue;
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dimse::{InformationModel, ModelOperation, QueryLevel};
use tracing::debug;

use crate::index::catalog::{AttributeCatalog, CatalogEntry, KeyRole};
use crate::index::codec::{element_string, normalize_value};
use crate::index::error::{DbError, Result};
use crate::index::matching;
use crate::index::record::InstanceRecord;

/// One matching key taken from the identifier
#[derive(Debug, Clone)]
pub struct QueryKey {
    pub entry: &'static CatalogEntry,
    /// Position of the attribute in record field order
    pub position: usize,
    pub value: String,
}

impl QueryKey {
    pub fn matches(&self, record: &InstanceRecord) -> bool {
        matching::matches(self.entry.class, &self.value, record.value_at(self.position))
    }
}

/// A request identifier resolved against the attribute catalog
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    model: InformationModel,
    level: QueryLevel,
    keys: Vec<QueryKey>,
}

impl ParsedQuery {
    /// Read the query level and every supported key from an identifier
    pub fn parse(model: InformationModel, identifier: &InMemDicomObject) -> Result<Self> {
        let raw_level = element_string(identifier, tags::QUERY_RETRIEVE_LEVEL)
            .ok_or_else(|| DbError::invalid_identifier("missing QueryRetrieveLevel"))?;
        let level: QueryLevel = raw_level
            .parse()
            .map_err(|e| DbError::invalid_identifier(format!("{}", e)))?;
        if !model.supports_level(level) {
            return Err(DbError::invalid_identifier(format!(
                "level {} does not exist in the {} model",
                level, model
            )));
        }

        let catalog = AttributeCatalog::global();
        let mut keys = Vec::new();
        for element in identifier.iter() {
            let tag = element.header().tag;
            if tag == tags::QUERY_RETRIEVE_LEVEL || tag == tags::SPECIFIC_CHARACTER_SET {
                continue;
            }
            let Some(position) = catalog.position(tag) else {
                debug!(%tag, "ignoring unsupported key");
                continue;
            };
            let value = element
                .to_str()
                .map(|s| normalize_value(&s))
                .unwrap_or_default();
            keys.push(QueryKey {
                entry: &catalog.entries()[position],
                position,
                value,
            });
        }

        Ok(Self { model, level, keys })
    }

    pub fn model(&self) -> InformationModel {
        self.model
    }

    pub fn level(&self) -> QueryLevel {
        self.level
    }

    pub fn keys(&self) -> &[QueryKey] {
        &self.keys
    }

    /// Level at which a key takes part in matching
    ///
    /// Patient attributes have no level of their own in Study Root and are
    /// folded into the STUDY level.
    pub fn effective_level(&self, key: &QueryKey) -> QueryLevel {
        key.entry.level.max(self.model.root_level())
    }

    fn is_foreign_patient_key(&self, key: &QueryKey) -> bool {
        key.entry.level < self.model.root_level()
    }

    /// Check key placement for C-FIND
    ///
    /// In non-strict mode misplaced keys are dropped instead of rejected.
    pub fn validate_for_find(&mut self, strict: bool) -> Result<()> {
        self.validate(ModelOperation::Find, strict)
    }

    /// Check key placement for C-MOVE and C-GET
    pub fn validate_for_move(&mut self, strict: bool) -> Result<()> {
        self.validate(ModelOperation::Move, strict)
    }

    fn validate(&mut self, op: ModelOperation, strict: bool) -> Result<()> {
        let mut kept = Vec::with_capacity(self.keys.len());
        for key in std::mem::take(&mut self.keys) {
            match self.placement_error(op, &key) {
                None => kept.push(key),
                Some(reason) if strict => return Err(DbError::invalid_identifier(reason)),
                Some(reason) => debug!(keyword = key.entry.keyword, %reason, "ignoring key"),
            }
        }
        self.keys = kept;

        if strict {
            self.check_key_counts(op)?;
        }
        Ok(())
    }

    fn placement_error(&self, op: ModelOperation, key: &QueryKey) -> Option<String> {
        let keyword = key.entry.keyword;
        if self.is_foreign_patient_key(key) {
            if op != ModelOperation::Find {
                return Some(format!("{} is not allowed in a {} retrieve", keyword, self.model));
            }
            if self.level != QueryLevel::Study {
                return Some(format!(
                    "{} is only allowed at STUDY level in {}",
                    keyword, self.model
                ));
            }
            return None;
        }

        let level = self.effective_level(key);
        if level > self.level {
            return Some(format!("{} is below the query level {}", keyword, self.level));
        }
        if level < self.level && key.entry.role != KeyRole::Unique {
            return Some(format!(
                "only unique keys are allowed above the query level, got {}",
                keyword
            ));
        }
        None
    }

    fn check_key_counts(&self, op: ModelOperation) -> Result<()> {
        let catalog = AttributeCatalog::global();
        for level in QueryLevel::range_inclusive(self.model.root_level(), self.level) {
            let unique = catalog.unique_key(level);
            let unique_count = self
                .keys
                .iter()
                .filter(|key| key.entry.tag == unique.tag)
                .count();

            if op == ModelOperation::Find {
                if level == self.level {
                    let at_level = self
                        .keys
                        .iter()
                        .filter(|key| self.effective_level(key) == level)
                        .count();
                    if at_level == 0 {
                        return Err(DbError::invalid_identifier(format!(
                            "no keys at query level {}",
                            level
                        )));
                    }
                } else if unique_count > 1 {
                    return Err(DbError::invalid_identifier(format!(
                        "more than one {} key",
                        unique.keyword
                    )));
                }
            } else if unique_count != 1 {
                return Err(DbError::invalid_identifier(format!(
                    "retrieve requires exactly one {} at level {}",
                    unique.keyword, level
                )));
            }
        }
        Ok(())
    }

    /// Hierarchical compare of a record against every retained key
    ///
    /// Keys above the query level are unique keys and restrict the ancestry,
    /// keys at the query level filter the candidates themselves.
    pub fn matches(&self, record: &InstanceRecord) -> bool {
        QueryLevel::range_inclusive(QueryLevel::Patient, self.level).all(|level| {
            self.keys
                .iter()
                .filter(|key| self.effective_level(key) == level)
                .all(|key| key.matches(record))
        })
    }

    /// Unique key values from PATIENT down to the query level
    ///
    /// Records sharing this tuple describe the same matched entity.
    pub fn ancestry(&self, record: &InstanceRecord) -> Vec<String> {
        QueryLevel::range_inclusive(QueryLevel::Patient, self.level)
            .map(|level| record.unique_value(level).to_string())
            .collect()
    }

    /// Response dataset: QueryRetrieveLevel plus the requested keys
    pub fn project(&self, record: &InstanceRecord) -> InMemDicomObject {
        let mut response = InMemDicomObject::new_empty();
        response.put(DataElement::new(
            tags::QUERY_RETRIEVE_LEVEL,
            VR::CS,
            PrimitiveValue::from(self.level.as_str()),
        ));
        for key in &self.keys {
            let value = record.value_at(key.position);
            let value = if value.is_empty() {
                PrimitiveValue::Empty
            } else {
                PrimitiveValue::from(value)
            };
            response.put(DataElement::new(key.entry.tag, key.entry.vr, value));
        }
        response
    }
}
