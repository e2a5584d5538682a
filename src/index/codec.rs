//! Record codec: positioned reads and writes on the index file
//!
//! Slot `i` lives at `table_size + i * record_size`. Allocation is a linear
//! scan for the first free slot, falling back to appending at the end.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use tracing::{debug, warn};

use crate::index::catalog::AttributeCatalog;
use crate::index::error::{DbError, Result};
use crate::index::record::{record_size, InstanceRecord, StudyTable, DESCRIPTOR_SIZE};

/// Offsets beyond this are suspicious for an index file, but not fatal
pub const SEEK_SOFT_LIMIT: u64 = 64 * 1024 * 1024;

/// An open index file
#[derive(Debug)]
pub struct IndexFile {
    file: File,
    path: PathBuf,
    max_studies: usize,
    record_size: usize,
}

impl IndexFile {
    /// Open the index file, creating it when missing
    pub fn open(path: &Path, max_studies: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| DbError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            max_studies,
            record_size: record_size(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying descriptor, used for locking
    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn max_studies(&self) -> usize {
        self.max_studies
    }

    pub fn table_size(&self) -> u64 {
        StudyTable::encoded_size(self.max_studies) as u64
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Write an empty descriptor table when the file is new
    ///
    /// Must be called under an exclusive lock. Returns true when the table was
    /// written. An existing file whose table was built for a different number
    /// of studies is refused and left untouched.
    pub fn initialize_if_empty(&mut self) -> Result<bool> {
        let len = self.file.metadata()?.len();
        if len > 0 {
            self.check_layout(len)?;
            return Ok(false);
        }
        self.write_study_table(&StudyTable::new(self.max_studies))?;
        debug!(path = %self.path.display(), max_studies = self.max_studies, "initialized index file");
        Ok(true)
    }

    fn check_layout(&mut self, len: u64) -> Result<()> {
        if len < DESCRIPTOR_SIZE as u64 {
            return Err(DbError::corrupt(format!(
                "{} is too short to hold a descriptor table",
                self.path.display()
            )));
        }
        let mut head = [0u8; DESCRIPTOR_SIZE];
        self.seek_to(0)?;
        self.file.read_exact(&mut head)?;
        let found = StudyTable::stored_capacity(&head).unwrap_or(0);
        if found != self.max_studies {
            return Err(DbError::LayoutMismatch {
                path: self.path.clone(),
                found,
                expected: self.max_studies,
            });
        }
        if len < self.table_size() {
            return Err(DbError::corrupt(format!(
                "{} has a truncated descriptor table",
                self.path.display()
            )));
        }
        if (len - self.table_size()) % self.record_size as u64 != 0 {
            warn!(path = %self.path.display(), len, "index file ends with a partial record slot");
        }
        Ok(())
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        if offset > SEEK_SOFT_LIMIT {
            warn!(offset, path = %self.path.display(), "seek beyond expected index size");
        }
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn slot_offset(&self, index: usize) -> u64 {
        self.table_size() + (index as u64) * (self.record_size as u64)
    }

    /// Number of record slots currently in the file, free ones included
    pub fn slot_count(&self) -> Result<usize> {
        let len = self.file.metadata()?.len();
        let records = len.saturating_sub(self.table_size());
        Ok((records / self.record_size as u64) as usize)
    }

    pub fn read_study_table(&mut self) -> Result<StudyTable> {
        let mut bytes = vec![0u8; self.table_size() as usize];
        self.seek_to(0)?;
        self.file.read_exact(&mut bytes)?;
        StudyTable::decode(&bytes, self.max_studies)
    }

    pub fn write_study_table(&mut self, table: &StudyTable) -> Result<()> {
        self.seek_to(0)?;
        self.file.write_all(&table.encode())?;
        self.file.flush()?;
        Ok(())
    }

    /// Read the record at `index`; `NotFound` past the end of file
    pub fn read_instance(&mut self, index: usize) -> Result<InstanceRecord> {
        let mut bytes = vec![0u8; self.record_size];
        self.seek_to(self.slot_offset(index))?;
        match self.file.read_exact(&mut bytes) {
            Ok(()) => InstanceRecord::decode(&bytes),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(DbError::NotFound(index)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_instance(&mut self, index: usize, record: &InstanceRecord) -> Result<()> {
        self.seek_to(self.slot_offset(index))?;
        self.file.write_all(&record.encode())?;
        self.file.flush()?;
        Ok(())
    }

    /// Overwrite a slot with an empty record
    pub fn free_instance(&mut self, index: usize) -> Result<()> {
        self.write_instance(index, &InstanceRecord::empty())
    }

    /// First free slot, or the slot just past the end of file
    pub fn allocate_instance_slot(&mut self) -> Result<usize> {
        let count = self.slot_count()?;
        for index in 0..count {
            if self.read_instance(index)?.is_free() {
                return Ok(index);
            }
        }
        Ok(count)
    }

    /// Every occupied slot in file order
    pub fn occupied_records(&mut self) -> Result<Vec<(usize, InstanceRecord)>> {
        let count = self.slot_count()?;
        let mut records = Vec::new();
        for index in 0..count {
            let record = self.read_instance(index)?;
            if !record.is_free() {
                records.push((index, record));
            }
        }
        Ok(records)
    }
}

/// Normalize a decoded attribute value for storage and matching
pub(crate) fn normalize_value(value: &str) -> String {
    value
        .trim_end_matches(|c: char| c == '\0' || c == ' ')
        .to_string()
}

/// Extract every indexed attribute from a dataset
///
/// Absent attributes stay empty and over-wide values are truncated to their
/// field width. File name, size and dates are filled in by the caller.
pub fn build_record_from_attributes(dataset: &InMemDicomObject) -> InstanceRecord {
    let mut record = InstanceRecord::empty();
    for entry in AttributeCatalog::global().entries() {
        if let Some(value) = element_string(dataset, entry.tag) {
            record.set_value(entry.tag, &value);
        }
    }
    if let Some(sop_class) = element_string(dataset, tags::SOP_CLASS_UID) {
        record.sop_class_uid = sop_class;
    }
    record
}

pub(crate) fn element_string(dataset: &InMemDicomObject, tag: dicom_core::Tag) -> Option<String> {
    dataset
        .element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| normalize_value(&s))
}
