//! Fixed-size records stored in the index file
//!
//! Strings are stored NUL-padded in fixed-width fields and numbers little
//! endian. Values wider than their field are truncated at a character
//! boundary when they are set, never rejected.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dimse::QueryLevel;
use serde::Serialize;

use crate::index::catalog::AttributeCatalog;
use crate::index::error::{DbError, Result};

const STUDY_UID_WIDTH: usize = 64;
const FILENAME_WIDTH: usize = 256;
const SOP_CLASS_UID_WIDTH: usize = 64;
// image size, recorded date, flags + padding
const RECORD_HEADER_NUMBERS: usize = 8 + 8 + 8;

/// Encoded size of one study descriptor
pub const DESCRIPTOR_SIZE: usize = STUDY_UID_WIDTH + 8 + 8 + 4 + 4;
const CAPACITY_OFFSET: usize = DESCRIPTOR_SIZE - 4;

const FLAG_NEW: u8 = 0x01;

/// Encoded size of one instance record
pub fn record_size() -> usize {
    FILENAME_WIDTH + SOP_CLASS_UID_WIDTH + RECORD_HEADER_NUMBERS
        + AttributeCatalog::global().fields_size()
}

/// Longest prefix of `value` that fits in `width` bytes
pub(crate) fn truncate_to_width(value: &str, width: usize) -> &str {
    if value.len() <= width {
        return value;
    }
    let mut end = width;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn put_fixed_str(buf: &mut BytesMut, value: &str, width: usize) {
    let value = truncate_to_width(value, width);
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, width - value.len());
}

fn get_fixed_str(buf: &mut &[u8], width: usize, field: &str) -> Result<String> {
    if buf.remaining() < width {
        return Err(DbError::corrupt(format!("record too short for field {}", field)));
    }
    let raw = &buf[..width];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(width);
    let value = std::str::from_utf8(&raw[..end])
        .map_err(|e| DbError::corrupt(format!("field {} is not valid UTF-8: {}", field, e)))?
        .to_string();
    buf.advance(width);
    Ok(value)
}

fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(DbError::corrupt(format!("record too short for {}", what)));
    }
    Ok(())
}

/// Per-study bookkeeping used for quota enforcement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudyDescriptor {
    pub study_instance_uid: String,
    pub study_size: u64,
    /// Microseconds since the Unix epoch of the latest store into the study
    pub last_recorded_date: i64,
    pub image_count: u32,
}

impl StudyDescriptor {
    /// A descriptor without images is free for reuse
    pub fn is_free(&self) -> bool {
        self.image_count == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // Every entry carries the capacity of its table
    fn encode(&self, buf: &mut BytesMut, capacity: u32) {
        put_fixed_str(buf, &self.study_instance_uid, STUDY_UID_WIDTH);
        buf.put_u64_le(self.study_size);
        buf.put_i64_le(self.last_recorded_date);
        buf.put_u32_le(self.image_count);
        buf.put_u32_le(capacity);
    }

    fn decode(buf: &mut &[u8]) -> Result<(Self, u32)> {
        let study_instance_uid = get_fixed_str(buf, STUDY_UID_WIDTH, "StudyInstanceUID")?;
        ensure_remaining(buf, 24, "study descriptor")?;
        let study_size = buf.get_u64_le();
        let last_recorded_date = buf.get_i64_le();
        let image_count = buf.get_u32_le();
        let capacity = buf.get_u32_le();
        let descriptor = Self {
            study_instance_uid,
            study_size,
            last_recorded_date,
            image_count,
        };
        Ok((descriptor, capacity))
    }
}

/// The descriptor table stored at the start of the index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyTable {
    descriptors: Vec<StudyDescriptor>,
}

impl StudyTable {
    /// A table of `capacity` free descriptors
    pub fn new(capacity: usize) -> Self {
        Self {
            descriptors: vec![StudyDescriptor::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.descriptors.len()
    }

    /// Encoded size of a table with `capacity` entries
    pub fn encoded_size(capacity: usize) -> usize {
        capacity * DESCRIPTOR_SIZE
    }

    pub fn get(&self, slot: usize) -> &StudyDescriptor {
        &self.descriptors[slot]
    }

    pub fn get_mut(&mut self, slot: usize) -> &mut StudyDescriptor {
        &mut self.descriptors[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &StudyDescriptor> {
        self.descriptors.iter()
    }

    /// Slot of the occupied descriptor for `study_uid`
    pub fn find(&self, study_uid: &str) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| !d.is_free() && d.study_instance_uid == study_uid)
    }

    pub fn first_free(&self) -> Option<usize> {
        self.descriptors.iter().position(StudyDescriptor::is_free)
    }

    /// Occupied descriptor with the smallest last recorded date
    pub fn oldest(&self) -> Option<usize> {
        self.descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_free())
            .min_by_key(|(slot, d)| (d.last_recorded_date, *slot))
            .map(|(slot, _)| slot)
    }

    /// Occupied descriptors
    pub fn occupied(&self) -> impl Iterator<Item = &StudyDescriptor> {
        self.descriptors.iter().filter(|d| !d.is_free())
    }

    pub fn encode(&self) -> BytesMut {
        let capacity = self.capacity() as u32;
        let mut buf = BytesMut::with_capacity(Self::encoded_size(self.capacity()));
        for descriptor in &self.descriptors {
            descriptor.encode(&mut buf, capacity);
        }
        buf
    }

    pub fn decode(bytes: &[u8], capacity: usize) -> Result<Self> {
        let mut buf = bytes;
        let mut descriptors = Vec::with_capacity(capacity);
        for slot in 0..capacity {
            let (descriptor, stamp) = StudyDescriptor::decode(&mut buf)?;
            if stamp as usize != capacity {
                return Err(DbError::corrupt(format!(
                    "descriptor {} belongs to a table of {} entries, expected {}",
                    slot, stamp, capacity
                )));
            }
            descriptors.push(descriptor);
        }
        Ok(Self { descriptors })
    }

    /// Capacity recorded in the first descriptor of an encoded table
    pub fn stored_capacity(bytes: &[u8]) -> Option<usize> {
        let mut field = bytes.get(CAPACITY_OFFSET..CAPACITY_OFFSET + 4)?;
        Some(field.get_u32_le() as usize)
    }
}

/// One indexed object
///
/// Catalog attributes are kept in catalog order; see [`AttributeCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub filename: String,
    pub sop_class_uid: String,
    pub image_size: u64,
    /// Microseconds since the Unix epoch at which the object was stored
    pub recorded_date: i64,
    /// Not yet reviewed
    pub is_new: bool,
    values: Vec<String>,
}

impl Default for InstanceRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl InstanceRecord {
    /// A free slot
    pub fn empty() -> Self {
        Self {
            filename: String::new(),
            sop_class_uid: String::new(),
            image_size: 0,
            recorded_date: 0,
            is_new: false,
            values: vec![String::new(); AttributeCatalog::global().len()],
        }
    }

    pub fn is_free(&self) -> bool {
        self.filename.is_empty()
    }

    /// Value of a catalog attribute, empty when absent or not indexed
    pub fn value(&self, tag: Tag) -> &str {
        AttributeCatalog::global()
            .position(tag)
            .map(|position| self.value_at(position))
            .unwrap_or("")
    }

    pub fn value_at(&self, position: usize) -> &str {
        &self.values[position]
    }

    /// Set a catalog attribute, truncating to the field width
    ///
    /// Returns false when the tag is not part of the catalog.
    pub fn set_value(&mut self, tag: Tag, value: &str) -> bool {
        let catalog = AttributeCatalog::global();
        match catalog.position(tag) {
            Some(position) => {
                let width = catalog.entries()[position].width;
                self.values[position] = truncate_to_width(value, width).to_string();
                true
            }
            None => false,
        }
    }

    /// Value of the unique key at `level`
    pub fn unique_value(&self, level: QueryLevel) -> &str {
        self.value_at(AttributeCatalog::global().unique_key_position(level))
    }

    pub fn sop_instance_uid(&self) -> &str {
        self.value(tags::SOP_INSTANCE_UID)
    }

    pub fn study_instance_uid(&self) -> &str {
        self.value(tags::STUDY_INSTANCE_UID)
    }

    pub fn series_instance_uid(&self) -> &str {
        self.value(tags::SERIES_INSTANCE_UID)
    }

    pub fn patient_id(&self) -> &str {
        self.value(tags::PATIENT_ID)
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_micros(self.recorded_date).single()
    }

    pub fn encode(&self) -> BytesMut {
        let catalog = AttributeCatalog::global();
        let mut buf = BytesMut::with_capacity(record_size());
        put_fixed_str(&mut buf, &self.filename, FILENAME_WIDTH);
        put_fixed_str(&mut buf, &self.sop_class_uid, SOP_CLASS_UID_WIDTH);
        buf.put_u64_le(self.image_size);
        buf.put_i64_le(self.recorded_date);
        buf.put_u8(if self.is_new { FLAG_NEW } else { 0 });
        buf.put_bytes(0, 7);
        for (entry, value) in catalog.entries().iter().zip(&self.values) {
            put_fixed_str(&mut buf, value, entry.width);
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let catalog = AttributeCatalog::global();
        let mut buf = bytes;
        let filename = get_fixed_str(&mut buf, FILENAME_WIDTH, "filename")?;
        let sop_class_uid = get_fixed_str(&mut buf, SOP_CLASS_UID_WIDTH, "SOPClassUID")?;
        ensure_remaining(buf, RECORD_HEADER_NUMBERS, "record header")?;
        let image_size = buf.get_u64_le();
        let recorded_date = buf.get_i64_le();
        let flags = buf.get_u8();
        buf.advance(7);
        let mut values = Vec::with_capacity(catalog.len());
        for entry in catalog.entries() {
            values.push(get_fixed_str(&mut buf, entry.width, entry.keyword)?);
        }
        Ok(Self {
            filename,
            sop_class_uid,
            image_size,
            recorded_date,
            is_new: flags & FLAG_NEW != 0,
            values,
        })
    }

    /// Whether a filename fits into the record without truncation
    pub fn filename_fits(filename: &str) -> bool {
        filename.len() <= FILENAME_WIDTH
    }
}
