//! Per-study quotas and eviction
//!
//! Every function here runs under the exclusive lock of a store or prune
//! call and works on the descriptor table loaded for that call. The caller
//! persists the table afterwards.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::index::codec::IndexFile;
use crate::index::error::{DbError, Result};
use crate::index::record::{InstanceRecord, StudyTable};

/// Per-study limit of one storage area
///
/// The number of studies is bounded by the capacity of the descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub max_bytes_per_study: u64,
}

/// Whether a record refers to the file currently being stored
fn is_same_file(filename: &str, keep: &Path) -> bool {
    let path = Path::new(filename);
    if path == keep {
        return true;
    }
    match (path.canonicalize(), keep.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Free a slot, delete its file and charge the removal to its study
///
/// A file that cannot be deleted is logged and left behind.
pub(crate) fn delete_record(
    index: &mut IndexFile,
    table: &mut StudyTable,
    slot: usize,
    record: &InstanceRecord,
    keep: Option<&Path>,
) -> Result<()> {
    index.free_instance(slot)?;

    if keep.is_some_and(|keep| is_same_file(&record.filename, keep)) {
        debug!(slot, filename = %record.filename, "keeping file of the object being stored");
    } else if let Err(e) = std::fs::remove_file(&record.filename) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(filename = %record.filename, error = %e, "failed to delete evicted file");
        }
    }

    if let Some(study) = table.find(record.study_instance_uid()) {
        let descriptor = table.get_mut(study);
        descriptor.study_size = descriptor.study_size.saturating_sub(record.image_size);
        descriptor.image_count = descriptor.image_count.saturating_sub(1);
        if descriptor.image_count == 0 {
            descriptor.clear();
        }
    }
    debug!(slot, sop_instance_uid = record.sop_instance_uid(), "removed record");
    Ok(())
}

/// Remove every record carrying the given SOP instance UID
pub(crate) fn remove_duplicates(
    index: &mut IndexFile,
    table: &mut StudyTable,
    sop_instance_uid: &str,
    keep: &Path,
) -> Result<usize> {
    let mut removed = 0;
    for (slot, record) in index.occupied_records()? {
        if record.sop_instance_uid() == sop_instance_uid {
            info!(slot, sop_instance_uid, "replacing previously stored instance");
            delete_record(index, table, slot, &record, Some(keep))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn evict_study(index: &mut IndexFile, table: &mut StudyTable, study: usize, keep: &Path) -> Result<()> {
    let uid = table.get(study).study_instance_uid.clone();
    info!(study_instance_uid = %uid, "evicting oldest study to make room");
    for (slot, record) in index.occupied_records()? {
        if record.study_instance_uid() == uid {
            delete_record(index, table, slot, &record, Some(keep))?;
        }
    }
    table.get_mut(study).clear();
    Ok(())
}

/// Oldest image of a study, ties broken by slot order
fn oldest_image(index: &mut IndexFile, study_uid: &str) -> Result<Option<(usize, InstanceRecord)>> {
    Ok(index
        .occupied_records()?
        .into_iter()
        .filter(|(_, record)| record.study_instance_uid() == study_uid)
        .min_by_key(|(slot, record)| (record.recorded_date, *slot)))
}

/// Make room for `record` and charge it to its study descriptor
///
/// Returns the descriptor slot. An image larger than the per-study quota is
/// refused before anything is evicted.
pub(crate) fn admit(
    index: &mut IndexFile,
    table: &mut StudyTable,
    policy: &QuotaPolicy,
    record: &InstanceRecord,
    keep: &Path,
) -> Result<usize> {
    if record.image_size > policy.max_bytes_per_study {
        return Err(DbError::out_of_resources(format!(
            "image of {} bytes exceeds the per-study quota of {} bytes",
            record.image_size, policy.max_bytes_per_study
        )));
    }

    let study_uid = record.study_instance_uid();
    let study = match table.find(study_uid).or_else(|| table.first_free()) {
        Some(study) => study,
        None => {
            let oldest = table
                .oldest()
                .ok_or_else(|| DbError::out_of_resources("no study descriptor available"))?;
            evict_study(index, table, oldest, keep)?;
            oldest
        }
    };

    while table.get(study).study_size + record.image_size > policy.max_bytes_per_study {
        match oldest_image(index, study_uid)? {
            Some((slot, victim)) => {
                info!(
                    slot,
                    sop_instance_uid = victim.sop_instance_uid(),
                    "evicting image to respect study quota"
                );
                delete_record(index, table, slot, &victim, Some(keep))?;
            }
            None => {
                warn!(
                    study_instance_uid = study_uid,
                    "study descriptor out of sync with its records, resetting"
                );
                table.get_mut(study).clear();
                break;
            }
        }
    }

    let descriptor = table.get_mut(study);
    descriptor.study_instance_uid = study_uid.to_string();
    descriptor.study_size += record.image_size;
    descriptor.image_count += 1;
    descriptor.last_recorded_date = record.recorded_date;
    Ok(study)
}

/// Recompute every descriptor from the records that survive
pub(crate) fn rebuild_descriptors(table: &mut StudyTable, records: &[(usize, InstanceRecord)]) {
    let mut rebuilt = StudyTable::new(table.capacity());
    for (slot, record) in records {
        let uid = record.study_instance_uid();
        let study = match rebuilt.find(uid) {
            Some(study) => study,
            None => match table
                .find(uid)
                .filter(|s| rebuilt.get(*s).is_free())
                .or_else(|| rebuilt.first_free())
            {
                Some(study) => study,
                None => {
                    warn!(slot, study_instance_uid = uid, "no descriptor left for study");
                    continue;
                }
            },
        };
        let descriptor = rebuilt.get_mut(study);
        descriptor.study_instance_uid = uid.to_string();
        descriptor.study_size += record.image_size;
        descriptor.image_count += 1;
        descriptor.last_recorded_date = descriptor.last_recorded_date.max(record.recorded_date);
    }
    *table = rebuilt;
}
