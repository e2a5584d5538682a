//! Database handle: the entry point used by DIMSE dispatchers
//!
//! A handle owns its own open description of the index file, so locks taken
//! by two handles exclude each other even inside one process. At most one
//! find or move sequence is active per handle; while one is, the handle holds
//! its shared lock and refuses every other operation.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use dicom_object::InMemDicomObject;
use dimse::{InformationModel, ModelOperation, QrStatus};
use tracing::{debug, error, info, warn};

use crate::config::StorageAreaConfig;
use crate::index::codec::{build_record_from_attributes, IndexFile};
use crate::index::error::{DbError, Result};
use crate::index::find::{FindContext, FindResponse};
use crate::index::lock::{IndexLock, LockMode};
use crate::index::query::ParsedQuery;
use crate::index::quota::{self, QuotaPolicy};
use crate::index::record::{InstanceRecord, StudyDescriptor};
use crate::index::retrieve::{MovePlan, MoveResponse};
use crate::storage::{FileNameGenerator, StorageArea};

#[derive(Debug)]
enum ActiveRequest {
    Find(FindContext),
    Move(MovePlan),
}

/// A session on one storage area
#[derive(Debug)]
pub struct DatabaseHandle {
    index: IndexFile,
    area: StorageArea,
    policy: QuotaPolicy,
    strict_key_checking: bool,
    names: FileNameGenerator,
    active: Option<ActiveRequest>,
}

impl DatabaseHandle {
    /// Open the storage area, creating its directory and index file as needed
    ///
    /// This is the only fallible step that leaves no usable handle behind. An
    /// index file laid out for another number of studies is refused untouched.
    pub fn open(config: &StorageAreaConfig) -> Result<Self> {
        let area = StorageArea::from_config(config)?;
        let mut index = IndexFile::open(area.index_path(), config.max_studies)?;
        {
            let _lock = IndexLock::acquire(index.file(), LockMode::Exclusive)?;
            if index.initialize_if_empty()? {
                info!(path = %area.index_path().display(), "created index file");
            }
        }
        debug!(
            path = %area.base_path().display(),
            max_studies = config.max_studies,
            max_bytes_per_study = config.max_bytes_per_study,
            "opened storage area"
        );

        Ok(Self {
            index,
            area,
            policy: QuotaPolicy {
                max_bytes_per_study: config.max_bytes_per_study,
            },
            strict_key_checking: config.strict_key_checking,
            names: FileNameGenerator::from_clock(),
            active: None,
        })
    }

    pub fn storage_area(&self) -> &StorageArea {
        &self.area
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Whether no find or move sequence is in progress
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.active.is_some() {
            return Err(DbError::RequestInProgress);
        }
        Ok(())
    }

    fn lock(&self, mode: LockMode) -> Result<IndexLock> {
        IndexLock::acquire(self.index.file(), mode)
    }

    fn resolve_model(sop_class_uid: &str, accepted: &[ModelOperation]) -> Result<InformationModel> {
        match InformationModel::from_sop_class(sop_class_uid) {
            Ok((model, op)) if accepted.contains(&op) => Ok(model),
            _ => Err(DbError::UnsupportedSopClass(sop_class_uid.to_string())),
        }
    }

    /// Start a C-FIND
    ///
    /// Returns `Pending` when at least one match exists; the matches are then
    /// fetched with [`next_find_response`](Self::next_find_response).
    pub fn start_find_request(
        &mut self,
        sop_class_uid: &str,
        identifier: &InMemDicomObject,
    ) -> Result<QrStatus> {
        self.ensure_idle()?;
        let model = Self::resolve_model(sop_class_uid, &[ModelOperation::Find])?;
        let mut query = ParsedQuery::parse(model, identifier)?;
        query.validate_for_find(self.strict_key_checking)?;
        debug!(%model, level = %query.level(), keys = query.keys().len(), "starting find");

        let lock = self.lock(LockMode::Shared)?;
        let mut context = FindContext::new(query, lock);
        if context.prefetch(&mut self.index)? {
            self.active = Some(ActiveRequest::Find(context));
            Ok(QrStatus::Pending)
        } else {
            debug!("find matched nothing");
            Ok(QrStatus::Success)
        }
    }

    /// Next match of the active find, or `Success` once exhausted
    pub fn next_find_response(&mut self) -> Result<FindResponse> {
        let Some(ActiveRequest::Find(context)) = self.active.as_mut() else {
            return Err(DbError::NoActiveRequest("find"));
        };

        let Some(dataset) = context.take_pending() else {
            self.active = None;
            return Ok(FindResponse::Success);
        };
        if let Err(e) = context.prefetch(&mut self.index) {
            error!(error = %e, "find scan failed");
            self.active = None;
            return Err(e);
        }
        Ok(FindResponse::Pending(dataset))
    }

    /// Abandon the active find and release its lock
    pub fn cancel_find_request(&mut self) -> QrStatus {
        if matches!(self.active, Some(ActiveRequest::Find(_))) {
            self.active = None;
            debug!("find cancelled");
        }
        QrStatus::Cancel
    }

    /// Start a C-MOVE or C-GET by planning every matching object up front
    pub fn start_move_request(
        &mut self,
        sop_class_uid: &str,
        identifier: &InMemDicomObject,
    ) -> Result<QrStatus> {
        self.ensure_idle()?;
        let model = Self::resolve_model(
            sop_class_uid,
            &[ModelOperation::Move, ModelOperation::Get],
        )?;
        let mut query = ParsedQuery::parse(model, identifier)?;
        query.validate_for_move(self.strict_key_checking)?;

        let lock = self.lock(LockMode::Shared)?;
        let plan = MovePlan::build(&query, &mut self.index, lock)?;
        if plan.remaining() > 0 {
            self.active = Some(ActiveRequest::Move(plan));
            Ok(QrStatus::Pending)
        } else {
            Ok(QrStatus::Success)
        }
    }

    /// Next planned object, or `Success` once the plan is drained
    pub fn next_move_response(&mut self) -> Result<MoveResponse> {
        let Some(ActiveRequest::Move(plan)) = self.active.as_mut() else {
            return Err(DbError::NoActiveRequest("move"));
        };

        match plan.next_item(&mut self.index) {
            Ok(Some(item)) => Ok(MoveResponse::Pending(item)),
            Ok(None) => {
                self.active = None;
                Ok(MoveResponse::Success)
            }
            Err(e) => {
                error!(error = %e, "retrieve step failed");
                self.active = None;
                Err(e)
            }
        }
    }

    /// Abandon the active move or get and release its lock
    pub fn cancel_move_request(&mut self) -> QrStatus {
        if matches!(self.active, Some(ActiveRequest::Move(_))) {
            self.active = None;
            debug!("retrieve cancelled");
        }
        QrStatus::Cancel
    }

    /// Index an object file the caller has already written
    ///
    /// Replaces any earlier record of the same SOP instance and enforces the
    /// study quotas. Returns the record slot.
    pub fn store_request(&mut self, path: &Path) -> Result<usize> {
        self.ensure_idle()?;

        let object = dicom_object::open_file(path)
            .map_err(|e| DbError::DicomObject(format!("{}: {}", path.display(), e)))?;
        let image_size = std::fs::metadata(path)?.len();

        let mut record = build_record_from_attributes(&object);
        if record.sop_class_uid.is_empty() {
            record.sop_class_uid = object
                .meta()
                .media_storage_sop_class_uid
                .trim_end_matches(|c: char| c == '\0' || c == ' ')
                .to_string();
        }
        if record.sop_instance_uid().is_empty() {
            return Err(DbError::DicomObject(format!(
                "{} has no SOPInstanceUID",
                path.display()
            )));
        }
        if record.study_instance_uid().is_empty() {
            return Err(DbError::DicomObject(format!(
                "{} has no StudyInstanceUID",
                path.display()
            )));
        }

        let filename = path.to_string_lossy().into_owned();
        if !InstanceRecord::filename_fits(&filename) {
            return Err(DbError::out_of_resources(format!(
                "file name too long for the index: {}",
                filename
            )));
        }
        if image_size > self.policy.max_bytes_per_study {
            return Err(DbError::out_of_resources(format!(
                "image of {} bytes exceeds the per-study quota of {} bytes",
                image_size, self.policy.max_bytes_per_study
            )));
        }
        record.filename = filename;
        record.image_size = image_size;
        record.recorded_date = Utc::now().timestamp_micros();
        record.is_new = true;

        let _lock = self.lock(LockMode::Exclusive)?;
        self.commit_store(&record, path).map_err(refuse_store)
    }

    /// Copy an object file into the storage area and index the copy
    ///
    /// Files already inside the storage area are indexed where they are, so
    /// eviction never deletes a file the area does not own. Returns the
    /// record slot.
    pub fn import_request(&mut self, source: &Path) -> Result<usize> {
        self.ensure_idle()?;
        if self.area.contains(source) {
            return self.store_request(source);
        }

        let object = dicom_object::open_file(source)
            .map_err(|e| DbError::DicomObject(format!("{}: {}", source.display(), e)))?;
        let sop_class_uid = object
            .meta()
            .media_storage_sop_class_uid
            .trim_end_matches(|c: char| c == '\0' || c == ' ')
            .to_string();
        let target = self.make_new_store_file_name(&sop_class_uid)?;
        std::fs::copy(source, &target)?;
        debug!(source = %source.display(), target = %target.display(), "copied object into storage area");

        self.store_request(&target).inspect_err(|_| {
            if let Err(e) = std::fs::remove_file(&target) {
                warn!(file = %target.display(), error = %e, "failed to remove refused copy");
            }
        })
    }

    fn commit_store(&mut self, record: &InstanceRecord, path: &Path) -> Result<usize> {
        let mut table = self.index.read_study_table()?;
        quota::remove_duplicates(&mut self.index, &mut table, record.sop_instance_uid(), path)?;
        let study = quota::admit(&mut self.index, &mut table, &self.policy, record, path)?;
        self.index.write_study_table(&table)?;

        let slot = self.index.allocate_instance_slot()?;
        self.index.write_instance(slot, record)?;
        info!(
            slot,
            study,
            sop_instance_uid = record.sop_instance_uid(),
            image_size = record.image_size,
            "stored instance"
        );
        Ok(slot)
    }

    /// Drop records whose file is gone and repair every study descriptor
    ///
    /// Returns the number of records removed.
    pub fn prune_invalid_records(&mut self) -> Result<usize> {
        self.ensure_idle()?;
        let _lock = self.lock(LockMode::Exclusive)?;

        let mut survivors = Vec::new();
        let mut pruned = 0;
        for (slot, record) in self.index.occupied_records()? {
            if is_readable(&record.filename) {
                survivors.push((slot, record));
            } else {
                warn!(slot, filename = %record.filename, "pruning record of unreadable file");
                self.index.free_instance(slot)?;
                pruned += 1;
            }
        }

        let mut table = self.index.read_study_table()?;
        quota::rebuild_descriptors(&mut table, &survivors);
        self.index.write_study_table(&table)?;
        info!(pruned, remaining = survivors.len(), "pruned index");
        Ok(pruned)
    }

    /// An unused path in the storage area for a new object of this SOP class
    pub fn make_new_store_file_name(&mut self, sop_class_uid: &str) -> Result<PathBuf> {
        Ok(self.area.new_store_file_name(sop_class_uid, &mut self.names)?)
    }

    /// Clear the "new" flag of the record at `index`
    pub fn instance_reviewed(&mut self, index: usize) -> Result<()> {
        self.ensure_idle()?;
        let _lock = self.lock(LockMode::Exclusive)?;

        let mut record = self.index.read_instance(index)?;
        if record.is_free() {
            return Err(DbError::NotFound(index));
        }
        if record.is_new {
            record.is_new = false;
            self.index.write_instance(index, &record)?;
            debug!(slot = index, "instance reviewed");
        }
        Ok(())
    }

    /// Occupied study descriptors
    pub fn study_descriptors(&mut self) -> Result<Vec<StudyDescriptor>> {
        self.ensure_idle()?;
        let _lock = self.lock(LockMode::Shared)?;
        let table = self.index.read_study_table()?;
        Ok(table.occupied().cloned().collect())
    }

    /// Occupied record slots in file order
    pub fn instance_records(&mut self) -> Result<Vec<(usize, InstanceRecord)>> {
        self.ensure_idle()?;
        let _lock = self.lock(LockMode::Shared)?;
        self.index.occupied_records()
    }
}

impl Drop for DatabaseHandle {
    fn drop(&mut self) {
        if self.active.take().is_some() {
            debug!("discarding unfinished request");
        }
    }
}

/// Failures while mutating the index are reported as a resource refusal
fn refuse_store(err: DbError) -> DbError {
    match err {
        DbError::Io(e) => DbError::out_of_resources(format!("index update failed: {}", e)),
        DbError::NotFound(slot) => {
            DbError::out_of_resources(format!("record slot {} unavailable", slot))
        }
        other => other,
    }
}

fn is_readable(filename: &str) -> bool {
    File::open(filename)
        .and_then(|file| file.metadata())
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}
