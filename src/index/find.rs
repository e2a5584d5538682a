//! C-FIND scan state
//!
//! A find sequence walks the record slots once, from slot 0 to the end of
//! the file, under the shared lock it was started with. Every matched entity
//! is reported once: the unique keys from PATIENT down to the query level
//! identify it, and records repeating an already reported tuple are skipped.

use std::collections::HashSet;

use dicom_object::InMemDicomObject;
use dimse::QrStatus;
use tracing::trace;

use crate::index::codec::IndexFile;
use crate::index::error::Result;
use crate::index::lock::IndexLock;
use crate::index::query::ParsedQuery;

/// One response of a find sequence
#[derive(Debug, Clone)]
pub enum FindResponse {
    /// A match, projected onto the requested keys
    Pending(InMemDicomObject),
    /// No further matches
    Success,
}

impl FindResponse {
    pub fn status(&self) -> QrStatus {
        match self {
            FindResponse::Pending(_) => QrStatus::Pending,
            FindResponse::Success => QrStatus::Success,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FindResponse::Pending(_))
    }

    pub fn dataset(&self) -> Option<&InMemDicomObject> {
        match self {
            FindResponse::Pending(dataset) => Some(dataset),
            FindResponse::Success => None,
        }
    }

    pub fn into_dataset(self) -> Option<InMemDicomObject> {
        match self {
            FindResponse::Pending(dataset) => Some(dataset),
            FindResponse::Success => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FindContext {
    query: ParsedQuery,
    cursor: usize,
    found: HashSet<Vec<String>>,
    pending: Option<InMemDicomObject>,
    // Held until the context is dropped
    _lock: IndexLock,
}

impl FindContext {
    pub(crate) fn new(query: ParsedQuery, lock: IndexLock) -> Self {
        Self {
            query,
            cursor: 0,
            found: HashSet::new(),
            pending: None,
            _lock: lock,
        }
    }

    /// Scan forward to the next unreported match and buffer it
    ///
    /// Returns false once the scan is exhausted.
    pub(crate) fn prefetch(&mut self, index: &mut IndexFile) -> Result<bool> {
        self.pending = self.advance(index)?;
        Ok(self.pending.is_some())
    }

    /// Hand out the buffered match, if any
    pub(crate) fn take_pending(&mut self) -> Option<InMemDicomObject> {
        self.pending.take()
    }

    fn advance(&mut self, index: &mut IndexFile) -> Result<Option<InMemDicomObject>> {
        let slots = index.slot_count()?;
        while self.cursor < slots {
            let slot = self.cursor;
            self.cursor += 1;

            let record = index.read_instance(slot)?;
            if record.is_free() || !self.query.matches(&record) {
                continue;
            }
            if !self.found.insert(self.query.ancestry(&record)) {
                trace!(slot, "skipping duplicate match");
                continue;
            }
            trace!(slot, "matched record");
            return Ok(Some(self.query.project(&record)));
        }
        Ok(None)
    }
}
