//! C-MOVE / C-GET planning
//!
//! The plan is a snapshot: matching slots are collected in file order by one
//! pass when the request starts, and each step re-reads its slot to report
//! the object. Slots freed after planning are skipped.

use std::collections::VecDeque;
use std::path::PathBuf;

use dimse::QrStatus;
use serde::Serialize;
use tracing::{debug, trace};

use crate::index::codec::IndexFile;
use crate::index::error::{DbError, Result};
use crate::index::lock::IndexLock;
use crate::index::query::ParsedQuery;

/// An object to transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveItem {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub filename: PathBuf,
    /// Planned objects still to be reported after this one
    pub remaining: usize,
}

/// One response of a move or get sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResponse {
    Pending(MoveItem),
    Success,
}

impl MoveResponse {
    pub fn status(&self) -> QrStatus {
        match self {
            MoveResponse::Pending(_) => QrStatus::Pending,
            MoveResponse::Success => QrStatus::Success,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MoveResponse::Pending(_))
    }

    pub fn item(&self) -> Option<&MoveItem> {
        match self {
            MoveResponse::Pending(item) => Some(item),
            MoveResponse::Success => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MovePlan {
    slots: VecDeque<usize>,
    _lock: IndexLock,
}

impl MovePlan {
    /// Collect every matching slot in file order
    pub(crate) fn build(query: &ParsedQuery, index: &mut IndexFile, lock: IndexLock) -> Result<Self> {
        let mut slots = VecDeque::new();
        for slot in 0..index.slot_count()? {
            let record = index.read_instance(slot)?;
            if !record.is_free() && query.matches(&record) {
                slots.push_back(slot);
            }
        }
        debug!(matches = slots.len(), level = %query.level(), "planned retrieve");
        Ok(Self { slots, _lock: lock })
    }

    pub(crate) fn remaining(&self) -> usize {
        self.slots.len()
    }

    /// Next planned object that still exists
    pub(crate) fn next_item(&mut self, index: &mut IndexFile) -> Result<Option<MoveItem>> {
        while let Some(slot) = self.slots.pop_front() {
            let record = match index.read_instance(slot) {
                Ok(record) => record,
                Err(DbError::NotFound(_)) => {
                    debug!(slot, "planned slot no longer exists");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if record.is_free() {
                debug!(slot, "planned slot was freed, skipping");
                continue;
            }
            trace!(slot, sop_instance_uid = record.sop_instance_uid(), "retrieve step");
            return Ok(Some(MoveItem {
                sop_instance_uid: record.sop_instance_uid().to_string(),
                sop_class_uid: record.sop_class_uid,
                filename: PathBuf::from(record.filename),
                remaining: self.slots.len(),
            }));
        }
        Ok(None)
    }
}
